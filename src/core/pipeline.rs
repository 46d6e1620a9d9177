//! Image build pipeline
//!
//! One pass per candidate path: classify, inspect, relocate or copy. After
//! every candidate has been placed the tree is swept of excluded and broken
//! entries and rule usage is collected.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::candidate::{CandidatePath, FileClass, FormatSniffer};
use crate::core::classify::{Classification, ClassificationPolicy, Verdict};
use crate::core::relocate::{BinaryEditor, RelocationEngine};
use crate::core::report::{FileRecord, Outcome, RunReport};
use crate::core::rules::{RuleKind, RuleUsage};
use crate::error::PortrootError;
use crate::infra::tree::{Placement, TreeAssembler};

/// Builds one image
pub struct ImageBuilder<E> {
    policy: ClassificationPolicy,
    engine: RelocationEngine<E>,
    tree: TreeAssembler,
    sniffer: Box<dyn FormatSniffer>,
    usage: RuleUsage,
    protected: HashSet<PathBuf>,
    report: RunReport,
}

impl<E: BinaryEditor> ImageBuilder<E> {
    /// Assemble a builder from its parts
    pub fn new(
        policy: ClassificationPolicy,
        engine: RelocationEngine<E>,
        tree: TreeAssembler,
        sniffer: Box<dyn FormatSniffer>,
    ) -> Self {
        let mut report = RunReport::new(tree.root().to_path_buf(), policy.profile());
        report.moved_aside = tree.moved_aside().map(Path::to_path_buf);

        let mut protected = HashSet::new();
        protected.insert(engine.loader_dest().to_path_buf());

        Self {
            policy,
            engine,
            tree,
            sniffer,
            usage: RuleUsage::new(),
            protected,
            report,
        }
    }

    /// The report collected so far
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Mutable access, for facts known only to the caller
    pub fn report_mut(&mut self) -> &mut RunReport {
        &mut self.report
    }

    /// Consume the builder
    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// The destination tree
    pub fn tree(&self) -> &TreeAssembler {
        &self.tree
    }

    /// Process every path in order, then run the sweeps
    pub fn build<I, P>(&mut self, paths: I) -> Result<&RunReport, PortrootError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.add_path(path.as_ref())?;
        }
        self.finish()
    }

    /// Classify and place one candidate.
    ///
    /// Only relocation and assembly failures are returned as errors; the
    /// failing file is recorded as [`Outcome::Failed`] first.
    pub fn add_path(&mut self, path: &Path) -> Result<Outcome, PortrootError> {
        let text = path.to_string_lossy();
        let verdict = self.policy.classify(&text);
        if let Some(rule) = verdict.rule {
            self.usage.record(rule);
        }

        let mut record = FileRecord {
            path: path.to_path_buf(),
            dest: None,
            class: verdict.class,
            rule: verdict.rule,
            format: None,
            runpath: None,
            outcome: Outcome::Included,
        };

        if !verdict.class.is_included() {
            tracing::debug!("Excluded {}", path.display());
            record.outcome = Outcome::Excluded(verdict.reason);
            return Ok(self.push(record));
        }

        let Some(dest) = self.policy.image_path(&text) else {
            record.outcome = Outcome::Warned("no destination inside the image".to_string());
            return Ok(self.push(record));
        };
        record.dest = Some(dest.clone());

        let candidate = match CandidatePath::inspect(path, self.sniffer.as_ref()) {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                tracing::warn!("Source file {} does not exist, skipping", path.display());
                record.outcome = Outcome::Warned("source file missing".to_string());
                return Ok(self.push(record));
            }
            Err(e) => {
                tracing::warn!("Cannot inspect {}: {e}", path.display());
                record.outcome = Outcome::Warned(format!("cannot inspect: {e}"));
                return Ok(self.push(record));
            }
        };
        record.format = Some(candidate.class);

        if verdict.class.is_explicit() {
            self.protected.insert(dest.clone());
        }

        match self.place(&candidate, &dest, verdict, &mut record) {
            Ok(outcome) => {
                record.outcome = outcome.clone();
                self.push(record);
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!("{}: {e}", path.display());
                record.outcome = Outcome::Failed(e.to_string());
                self.push(record);
                Err(e)
            }
        }
    }

    fn place(
        &mut self,
        candidate: &CandidatePath,
        dest: &Path,
        verdict: Verdict,
        record: &mut FileRecord,
    ) -> Result<Outcome, PortrootError> {
        let relocatable = candidate.class.is_elf() && verdict.class != Classification::MustCopy;

        if candidate.is_symlink() {
            let placement = self.tree.add(&candidate.path, dest)?;
            return Ok(placement_outcome(placement));
        }

        if verdict.class == Classification::MustPatch && !candidate.class.is_elf() {
            tracing::warn!(
                "{} is not a dynamic ELF binary, copying without relocation",
                candidate.path.display()
            );
            let placement = self.tree.add(&candidate.path, dest)?;
            return Ok(warn_unless_written(
                placement,
                "not a dynamic ELF binary; copied without relocation",
            ));
        }

        if relocatable && self.engine.should_skip(dest) {
            tracing::warn!(
                "Not relocating {}: known to break when edited",
                candidate.path.display()
            );
            let placement = self.tree.add(&candidate.path, dest)?;
            return Ok(warn_unless_written(
                placement,
                "relocation skipped for known library; copied verbatim",
            ));
        }

        if !relocatable {
            let placement = self.tree.add(&candidate.path, dest)?;
            return Ok(placement_outcome(placement));
        }

        if !self.tree.would_write(dest) {
            tracing::debug!("{} already present", dest.display());
            return Ok(Outcome::Included);
        }

        let job = self.engine.job(&candidate.path, dest);
        let artifact = self.engine.relocate(&job, candidate.class)?;
        record.runpath = Some(artifact.runpath.clone());

        let placed = self
            .tree
            .add_file_from(&artifact.staged, dest, &candidate.path);
        let loader = artifact.loader.clone();
        artifact.discard();
        let placement = placed?;

        if let Some(loader) = loader {
            self.engine.propagate_loader(&loader, &mut self.tree)?;
        }

        Ok(placement_outcome(placement))
    }

    /// Run the exclusion and broken-symlink sweeps and collect rule usage
    pub fn finish(&mut self) -> Result<&RunReport, PortrootError> {
        let profile = self.policy.profile();

        tracing::info!("Sweeping excluded paths");
        self.report.swept = self.tree.sweep_excluded(
            self.policy.rules(),
            profile,
            &self.protected,
            &mut self.usage,
        )?;
        self.report.broken_symlinks = self.tree.sweep_broken_symlinks()?;

        self.report.unused_rules = self.usage.unused(self.policy.rules(), profile);
        for rule in &self.report.unused_rules {
            if matches!(rule.id.kind, RuleKind::MustExclude(_)) {
                tracing::warn!("Exclusion rule {} '{}' matched nothing", rule.id, rule.pattern);
            }
        }

        self.report.loader = self.engine.propagated_loader().map(Path::to_path_buf);
        self.report.writes = self.tree.writes();

        tracing::info!("{}", self.report.summary());
        Ok(&self.report)
    }

    fn push(&mut self, record: FileRecord) -> Outcome {
        let outcome = record.outcome.clone();
        tracing::debug!("{}: {}", record.path.display(), outcome.label());
        self.report.record(record);
        outcome
    }
}

fn placement_outcome(placement: Placement) -> Outcome {
    match placement {
        Placement::Written | Placement::AlreadyPresent => Outcome::Included,
        Placement::MissingSource => Outcome::Warned("source file missing".to_string()),
        Placement::SkippedSymlink { target } => Outcome::Warned(format!(
            "symlink target '{}' is outside its directory",
            target.display()
        )),
    }
}

fn warn_unless_written(placement: Placement, reason: &str) -> Outcome {
    match placement_outcome(placement) {
        Outcome::Included => Outcome::Warned(reason.to_string()),
        other => other,
    }
}

/// Format class of `path` as seen by the pipeline, for the `classify` command
pub fn inspect_format(path: &Path, sniffer: &dyn FormatSniffer) -> Option<FileClass> {
    CandidatePath::inspect(path, sniffer).ok().flatten().map(|c| c.class)
}
