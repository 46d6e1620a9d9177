//! Default configuration values

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "portroot.toml";

/// Maximum number of attempts for a flaky package query
pub const MAX_QUERY_ATTEMPTS: u32 = 3;

/// Fixed delay between package query attempts (in milliseconds)
pub const QUERY_RETRY_DELAY_MS: u64 = 2000;

/// Package database whose modification time keys the closure cache
pub const DEFAULT_PACKAGE_DATABASE: &str = "/var/lib/rpm";

/// Architectures kept by the closure query (64-bit plus arch-independent)
pub const DEFAULT_ARCHES: &str = "x86_64,noarch";

/// Library root at the top of the image; every rewritten search path points here
pub const DEFAULT_LIB_ROOT: &str = "lib64";

/// Canonical path of the host dynamic loader
pub const DEFAULT_LOADER: &str = "/lib64/ld-linux-x86-64.so.2";

/// Fixed destination of the propagated dynamic loader inside the image
pub const DEFAULT_LOADER_DEST: &str = "lib64/ld-linux-x86-64.so.2";

/// Default destination directory of the image
pub const DEFAULT_IMAGE_DIR: &str = "image";

/// Environment variable overriding the cache directory
pub const ENV_CACHE_DIR: &str = "PORTROOT_CACHE_DIR";

/// Library file-name prefixes that are never rewritten (copied verbatim instead)
pub const SKIP_RELOCATION_PREFIXES: &[&str] =
    &["ld-linux", "ld-2.", "libc.so", "libc-2.", "libpthread", "libthread_db"];

/// Substrings marking debug or test payloads; a hit excludes the path outright
pub const DEBUG_SENTINELS: &[&str] = &[
    "/usr/lib/debug/",
    "/usr/src/debug/",
    "/__pycache__/",
    "/tests/",
    "/test/",
    ".debug",
];

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
