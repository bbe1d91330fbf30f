//! Build metadata captured by `build.rs`.

/// `gqlforge 0.4.0 (abc1234 2026-10-19) rustc 1.80.0`
pub fn version() -> String {
    format!(
        "gqlforge {} ({} {}) rustc {}",
        package_version(),
        build_commit(),
        build_date(),
        rustc_version()
    )
}

pub fn package_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Short commit hash, or "unknown" outside a git checkout.
pub fn build_commit() -> &'static str {
    option_env!("GQLFORGE_COMMIT_SHA").unwrap_or("unknown")
}

pub fn build_date() -> &'static str {
    option_env!("GQLFORGE_BUILD_DATE").unwrap_or("unknown")
}

pub fn rustc_version() -> &'static str {
    option_env!("GQLFORGE_RUSTC_VERSION").unwrap_or("unknown")
}
