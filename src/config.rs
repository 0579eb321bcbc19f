use std::collections::HashSet;

use crate::error::ConfigError;

/// Run configuration, read once from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub access_token: String,
    pub user: String,
    pub excluded_repos: HashSet<String>,
    pub excluded_langs: HashSet<String>,
    pub ignore_forked_repos: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_token = lookup("ACCESS_TOKEN")
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingCredential)?;
        let user = lookup("GITHUB_ACTOR").ok_or(ConfigError::MissingActor)?;

        Ok(Self {
            access_token,
            user,
            excluded_repos: parse_list(lookup("EXCLUDED").as_deref()),
            excluded_langs: parse_list(lookup("EXCLUDED_LANGS").as_deref()),
            ignore_forked_repos: parse_flag(lookup("EXCLUDE_FORKED_REPOS").as_deref()),
        })
    }
}

/// Comma-separated list, each entry trimmed, blanks dropped.
fn parse_list(raw: Option<&str>) -> HashSet<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Set, non-empty and not `false` in any case.
fn parse_flag(raw: Option<&str>) -> bool {
    match raw {
        Some(v) if !v.is_empty() => !v.trim().eq_ignore_ascii_case("false"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 2] = [("ACCESS_TOKEN", "ghp_x"), ("GITHUB_ACTOR", "octocat")];

    fn with(extra: &[(&str, &str)]) -> Config {
        let mut pairs = BASE.to_vec();
        pairs.extend_from_slice(extra);
        Config::from_lookup(env(&pairs)).unwrap()
    }

    #[test]
    fn missing_token_is_rejected() {
        let err = Config::from_lookup(env(&[("GITHUB_ACTOR", "octocat")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential);

        let err = Config::from_lookup(env(&[("ACCESS_TOKEN", ""), ("GITHUB_ACTOR", "octocat")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential);
    }

    #[test]
    fn missing_actor_is_rejected() {
        let err = Config::from_lookup(env(&[("ACCESS_TOKEN", "ghp_x")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingActor);
    }

    #[test]
    fn exclusion_lists_are_trimmed() {
        let cfg = with(&[
            ("EXCLUDED", " octocat/a ,octocat/b,, "),
            ("EXCLUDED_LANGS", "HTML, Jupyter Notebook"),
        ]);
        let repos: HashSet<String> = ["octocat/a", "octocat/b"].map(String::from).into();
        let langs: HashSet<String> = ["HTML", "Jupyter Notebook"].map(String::from).into();
        assert_eq!(cfg.excluded_repos, repos);
        assert_eq!(cfg.excluded_langs, langs);
    }

    #[test]
    fn absent_lists_are_empty() {
        let cfg = with(&[]);
        assert!(cfg.excluded_repos.is_empty());
        assert!(cfg.excluded_langs.is_empty());
    }

    #[test]
    fn fork_flag_truthiness() {
        assert!(!with(&[]).ignore_forked_repos);
        assert!(!with(&[("EXCLUDE_FORKED_REPOS", "")]).ignore_forked_repos);
        assert!(!with(&[("EXCLUDE_FORKED_REPOS", "false")]).ignore_forked_repos);
        assert!(!with(&[("EXCLUDE_FORKED_REPOS", "FaLsE")]).ignore_forked_repos);
        assert!(with(&[("EXCLUDE_FORKED_REPOS", "true")]).ignore_forked_repos);
        assert!(with(&[("EXCLUDE_FORKED_REPOS", "0")]).ignore_forked_repos);
        assert!(with(&[("EXCLUDE_FORKED_REPOS", "yes")]).ignore_forked_repos);
    }
}
