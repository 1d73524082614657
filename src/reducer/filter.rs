//! Package-manager lifecycle commands that are never executed.
//!
//! The session manager installs dependencies and starts the dev server on its
//! own, so responses asking for the same thing are acknowledged instead of
//! run. Running them would duplicate the install and fight over the single
//! dev-server slot.

/// Patterns skipped when no `[commands] skip` list is configured.
pub const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    "npm install",
    "npm i",
    "npm ci",
    "npm run dev",
    "npm run build",
    "npm run start",
    "npm start",
    "yarn install",
    "yarn dev",
    "yarn build",
    "yarn start",
    "yarn run dev",
    "yarn run build",
    "yarn run start",
    "pnpm install",
    "pnpm i",
    "pnpm dev",
    "pnpm build",
    "pnpm start",
    "pnpm run dev",
    "pnpm run build",
    "pnpm run start",
    "bun install",
    "bun i",
    "bun dev",
    "bun run dev",
    "bun run build",
    "bun run start",
    "bun start",
];

/// Case-sensitive, word-aware prefix matcher over a list of command patterns.
///
/// A command matches a pattern when, after trimming, it equals the pattern or
/// continues it with whitespace. `npm install lodash` matches `npm install`;
/// `npm init` does not match `npm i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFilter {
    patterns: Vec<String>,
}

impl Default for CommandFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_PATTERNS.iter().copied())
    }
}

impl CommandFilter {
    /// Build a filter. Blank patterns are dropped.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.into().trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// A filter that lets every command through.
    pub fn allow_all() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// The first pattern `command` matches, if any.
    pub fn matched(&self, command: &str) -> Option<&str> {
        let command = command.trim();
        self.patterns
            .iter()
            .find(|pattern| {
                command.strip_prefix(pattern.as_str()).is_some_and(|rest| {
                    rest.is_empty() || rest.starts_with(char::is_whitespace)
                })
            })
            .map(String::as_str)
    }

    pub fn is_skipped(&self, command: &str) -> bool {
        self.matched(command).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lifecycle_commands_are_skipped() {
        let filter = CommandFilter::default();
        for command in [
            "npm install",
            "npm i",
            "npm ci",
            "npm run dev",
            "npm run build",
            "npm run start",
            "npm start",
            "  npm install  ",
            "npm install --legacy-peer-deps",
            "npm install react-router-dom",
            "yarn install",
            "pnpm run dev",
            "bun install",
        ] {
            assert!(filter.is_skipped(command), "expected '{}' to be skipped", command);
        }
    }

    #[test]
    fn test_other_commands_pass() {
        let filter = CommandFilter::default();
        for command in [
            "npm run test",
            "npm init -y",
            "npm installer",
            "npx vite build",
            "NPM INSTALL",
            "cd app && npm install",
            "node index.js",
            "yarn add react",
            "",
        ] {
            assert!(!filter.is_skipped(command), "expected '{}' to pass", command);
        }
    }

    #[test]
    fn test_matched_reports_pattern() {
        let filter = CommandFilter::default();
        assert_eq!(filter.matched("npm i --save x"), Some("npm i"));
        assert_eq!(filter.matched("npm run test"), None);
    }

    #[test]
    fn test_custom_patterns() {
        let filter = CommandFilter::new(["make", "  ", "cargo build"]);
        assert_eq!(filter.patterns(), &["make".to_string(), "cargo build".to_string()]);
        assert!(filter.is_skipped("make all"));
        assert!(filter.is_skipped("cargo build --release"));
        assert!(!filter.is_skipped("npm install"));
        assert!(!CommandFilter::allow_all().is_skipped("npm install"));
    }
}
