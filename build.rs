//! Build script: embeds the crate version from `CONFIG_RESOLVER_VERSION` or `git describe`.

use std::process::Command;

fn main() {
    // Prefer CONFIG_RESOLVER_VERSION env var if set (e.g., by CI release workflow),
    // otherwise fall back to git describe for local development builds.
    if let Ok(version) = std::env::var("CONFIG_RESOLVER_VERSION") {
        println!("cargo:rustc-env=CONFIG_RESOLVER_VERSION={version}");
    } else if let Ok(output) = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        && output.status.success()
    {
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=CONFIG_RESOLVER_VERSION={version}");
    }

    // Re-run if git HEAD changes or env var changes
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-env-changed=CONFIG_RESOLVER_VERSION");
}
