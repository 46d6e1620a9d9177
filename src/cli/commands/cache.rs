//! CLI command for `portroot cache`
//!
//! Inspects and clears the closure/manifest cache.

use anyhow::Result;
use serde_json::json;

use crate::cli::output::status;
use crate::cli::GlobalOptions;
use crate::core::cache::ClosureCache;
use crate::infra::dirs::PortrootDirs;

fn cache() -> ClosureCache {
    ClosureCache::new(PortrootDirs::new().closure_cache_dir())
}

/// Execute cache info subcommand
pub fn execute_info(global: &GlobalOptions) -> Result<()> {
    let info = cache().info();

    if global.json {
        let value = json!({
            "path": info.path,
            "size_bytes": info.size_bytes,
            "item_count": info.item_count,
            "exists": info.exists,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Location: {}", info.path.display());
    println!("Size: {}", info.format_size());
    println!("Items: {}", info.item_count);

    if !info.exists {
        println!("\n{} Cache directory does not exist (empty cache)", status::WARNING);
    }

    Ok(())
}

/// Execute cache clean subcommand
pub fn execute_clean(global: &GlobalOptions) -> Result<()> {
    let cache = cache();
    let before = cache.info();
    let freed = cache.clean()?;

    if global.json {
        println!(
            "{}",
            json!({ "freed_bytes": freed, "entries": before.item_count })
        );
    } else if freed > 0 {
        println!(
            "{} Cache cleared ({} entries, {} freed)",
            status::SUCCESS,
            before.item_count,
            before.format_size()
        );
    } else {
        println!("{} Cache was already empty", status::SUCCESS);
    }

    Ok(())
}
