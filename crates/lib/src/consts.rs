/// Application name, used for temp directory prefixes and env var namespacing.
pub const APP_NAME: &str = "artifactor";

/// Secret store key holding the source-hosting access token.
pub const TOKEN_SECRET_KEY: &str = "aws-basics/github-app/token";

/// Build configuration file read from the root of a checkout.
pub const BUILDS_FILENAME: &str = "builds.yaml";

/// Environment variable names injected into build commands.
pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const ENV_EXTERNAL_TOKEN: &str = "GITHUB_ACCESS_TOKEN";

/// Output directory archived for Go bundles.
pub const DIST_DIR: &str = "dist";

/// Dependency directory always shipped with Node bundles that restrict their includes.
pub const NODE_MODULES_DIR: &str = "node_modules";

/// Username accepted by the registry for password-on-stdin logins.
pub const REGISTRY_USERNAME: &str = "AWS";
