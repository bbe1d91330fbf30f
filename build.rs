use std::process::Command;

/// First line of a command's stdout, if it ran successfully.
fn command_line(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    text.lines().next().map(|line| line.trim().to_string())
}

fn main() {
    let commit_sha = command_line("git", &["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let build_date = command_line("date", &["-u", "+%Y-%m-%d"]).unwrap_or_else(|| "unknown".into());

    // "rustc 1.78.0 (9b00956e5 2024-04-29)" -> "1.78.0"
    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".into());
    let rustc_version = command_line(&rustc, &["--version"])
        .and_then(|line| line.split_whitespace().nth(1).map(str::to_string))
        .unwrap_or_else(|| "unknown".into());

    println!("cargo:rustc-env=GQLFORGE_COMMIT_SHA={commit_sha}");
    println!("cargo:rustc-env=GQLFORGE_BUILD_DATE={build_date}");
    println!("cargo:rustc-env=GQLFORGE_RUSTC_VERSION={rustc_version}");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
