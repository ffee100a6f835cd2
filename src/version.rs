//! Build identity reported to the backend and printed by the CLI.
//!
//! The backend sees every request tagged `User-Agent: vedanta/<version>`,
//! where `<version>` is the crate version plus the git branch and short
//! commit the binary was built from (`0.1.0+main.abc1234`). Builds outside
//! a git checkout report `0.1.0+unknown.unknown`.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Product token at the front of the `User-Agent` header.
const PRODUCT: &str = "vedanta";

const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};

const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

fn git_dirty() -> bool {
    option_env!("VERGEN_GIT_DIRTY") == Some("true")
}

/// `{version}+{branch}.{short sha}`, with `.dirty` appended for builds from
/// a modified tree.
pub fn version_string() -> String {
    let sha = &GIT_SHA[..7.min(GIT_SHA.len())];
    // Branch names may contain `/`; keep the build metadata one token.
    let branch = GIT_BRANCH.replace(['/', ' '], "-");
    let dirty = if git_dirty() { ".dirty" } else { "" };
    format!("{PKG_VERSION}+{branch}.{sha}{dirty}")
}

/// Value of the `User-Agent` header: `vedanta/0.1.0+main.abc1234`.
pub fn user_agent() -> String {
    format!("{PRODUCT}/{}", version_string())
}
