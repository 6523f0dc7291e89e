//! Identifiers: who owns a repository, which repository, and which branch.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("value cannot be empty")]
    Empty,
    #[error("value is longer than {0} characters")]
    TooLong(usize),
    #[error("invalid character in value: {0:?}")]
    InvalidCharacter(char),
    #[error("value cannot start with '{0}'")]
    InvalidStart(char),
    #[error("value cannot end with '{0}'")]
    InvalidEnd(char),
    #[error("missing separator '/' in repo key")]
    MissingSeparator,
    #[error("missing separator '@' before branch")]
    MissingBranch,
    #[error("invalid owner: {0}")]
    InvalidOwner(#[source] Box<ParseError>),
    #[error("invalid repo: {0}")]
    InvalidRepo(#[source] Box<ParseError>),
    #[error("invalid branch: {0}")]
    InvalidBranch(#[source] Box<ParseError>),
}

/// What a name segment may contain.
struct NameRules {
    max_len: Option<usize>,
    not_first: &'static [char],
    not_last: &'static [char],
    allowed: fn(char) -> bool,
}

impl NameRules {
    fn check(&self, s: &str) -> Result<(), ParseError> {
        let first = s.chars().next().ok_or(ParseError::Empty)?;
        if let Some(max) = self.max_len.filter(|max| s.chars().count() > *max) {
            return Err(ParseError::TooLong(max));
        }
        if self.not_first.contains(&first) {
            return Err(ParseError::InvalidStart(first));
        }
        if let Some(last) = s.chars().last().filter(|c| self.not_last.contains(c)) {
            return Err(ParseError::InvalidEnd(last));
        }
        match s.chars().find(|c| !(self.allowed)(*c)) {
            Some(c) => Err(ParseError::InvalidCharacter(c)),
            None => Ok(()),
        }
    }
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident, $rules:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $rules.check(s)?;
                Ok($name(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

name_type!(
    /// A GitHub user or organization login: ASCII alphanumerics and inner
    /// hyphens, at most 39 characters.
    Owner,
    NameRules {
        max_len: Some(39),
        not_first: &['-'],
        not_last: &['-'],
        allowed: |c| c.is_ascii_alphanumeric() || c == '-',
    }
);

name_type!(
    /// A repository name: ASCII alphanumerics plus `-`, `_` and `.`, not
    /// starting with a dot.
    Repo,
    NameRules {
        max_len: Some(100),
        not_first: &['.'],
        not_last: &[],
        allowed: |c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'),
    }
);

name_type!(
    /// A ref name usable on the left of a `<ref>:<path>` expression.
    /// Whitespace and `:` would break the expression; anything else is left
    /// for the remote to judge.
    Branch,
    NameRules {
        max_len: None,
        not_first: &[],
        not_last: &[],
        allowed: |c| !c.is_whitespace() && c != ':',
    }
);

/// `owner/repo`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoKey {
    pub owner: Owner,
    pub repo: Repo,
}

impl RepoKey {
    pub fn new(owner: Owner, repo: Repo) -> Self {
        Self { owner, repo }
    }
}

impl FromStr for RepoKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, repo) = s.split_once('/').ok_or(ParseError::MissingSeparator)?;
        Ok(RepoKey {
            owner: owner
                .parse()
                .map_err(|e| ParseError::InvalidOwner(Box::new(e)))?,
            repo: repo
                .parse()
                .map_err(|e| ParseError::InvalidRepo(Box::new(e)))?,
        })
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// The `(owner, repo, branch)` triple every cached path is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub key: RepoKey,
    pub branch: Branch,
}

impl Namespace {
    pub fn new(key: RepoKey, branch: Branch) -> Self {
        Self { key, branch }
    }

    pub fn owner(&self) -> &str {
        self.key.owner.as_str()
    }

    pub fn repo(&self) -> &str {
        self.key.repo.as_str()
    }

    pub fn branch(&self) -> &str {
        self.branch.as_str()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.branch)
    }
}

/// Parses the `owner/repo@branch` form produced by `Display`.
impl FromStr for Namespace {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, branch) = s.rsplit_once('@').ok_or(ParseError::MissingBranch)?;
        let branch = branch
            .parse()
            .map_err(|e| ParseError::InvalidBranch(Box::new(e)))?;
        Ok(Namespace::new(key.parse()?, branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod owner_tests {
        use super::*;

        #[test]
        fn valid_owner_with_hyphen() {
            let owner: Owner = "my-org".parse().unwrap();
            assert_eq!(owner.as_str(), "my-org");
        }

        #[test]
        fn invalid_owner_empty() {
            assert_eq!("".parse::<Owner>(), Err(ParseError::Empty));
        }

        #[test]
        fn invalid_owner_leading_hyphen() {
            assert_eq!("-user".parse::<Owner>(), Err(ParseError::InvalidStart('-')));
        }

        #[test]
        fn invalid_owner_trailing_hyphen() {
            assert_eq!("user-".parse::<Owner>(), Err(ParseError::InvalidEnd('-')));
        }

        #[test]
        fn invalid_owner_too_long() {
            let name = "a".repeat(40);
            assert_eq!(name.parse::<Owner>(), Err(ParseError::TooLong(39)));
            assert!("a".repeat(39).parse::<Owner>().is_ok());
        }

        #[test]
        fn invalid_owner_underscore() {
            assert_eq!(
                "my_org".parse::<Owner>(),
                Err(ParseError::InvalidCharacter('_'))
            );
        }
    }

    mod repo_tests {
        use super::*;

        #[test]
        fn valid_repo_complex() {
            let repo: Repo = "my-repo_v2.0".parse().unwrap();
            assert_eq!(repo.as_str(), "my-repo_v2.0");
        }

        #[test]
        fn invalid_repo_leading_dot() {
            assert_eq!(".hidden".parse::<Repo>(), Err(ParseError::InvalidStart('.')));
        }

        #[test]
        fn invalid_repo_slash() {
            assert_eq!(
                "my/repo".parse::<Repo>(),
                Err(ParseError::InvalidCharacter('/'))
            );
        }
    }

    mod repo_key_tests {
        use super::*;

        #[test]
        fn valid_repo_key() {
            let key: RepoKey = "octocat/hello-world".parse().unwrap();
            assert_eq!(key.owner.as_str(), "octocat");
            assert_eq!(key.repo.as_str(), "hello-world");
            assert_eq!(key.to_string(), "octocat/hello-world");
        }

        #[test]
        fn invalid_repo_key_no_slash() {
            assert_eq!(
                "octocat".parse::<RepoKey>(),
                Err(ParseError::MissingSeparator)
            );
        }

        #[test]
        fn invalid_repo_key_invalid_parts() {
            assert!(matches!(
                "-owner/repo".parse::<RepoKey>(),
                Err(ParseError::InvalidOwner(_))
            ));
            assert!(matches!(
                "owner/.repo".parse::<RepoKey>(),
                Err(ParseError::InvalidRepo(_))
            ));
        }
    }

    mod branch_tests {
        use super::*;

        #[test]
        fn valid_branch_with_slashes() {
            let branch: Branch = "feature/tree-cache".parse().unwrap();
            assert_eq!(branch.as_str(), "feature/tree-cache");
        }

        #[test]
        fn invalid_branch_colon() {
            assert_eq!(
                "main:src".parse::<Branch>(),
                Err(ParseError::InvalidCharacter(':'))
            );
        }

        #[test]
        fn invalid_branch_empty() {
            assert_eq!("".parse::<Branch>(), Err(ParseError::Empty));
        }
    }

    #[test]
    fn namespace_parses_display_form() {
        let ns: Namespace = "octocat/hello-world@feature/x".parse().unwrap();
        assert_eq!(ns.branch(), "feature/x");
        assert_eq!(ns.to_string().parse::<Namespace>(), Ok(ns));

        assert_eq!(
            "octocat/hello-world".parse::<Namespace>(),
            Err(ParseError::MissingBranch)
        );
        assert!(matches!(
            "octocat/hello-world@".parse::<Namespace>(),
            Err(ParseError::InvalidBranch(_))
        ));
        assert!(matches!(
            "octocat@main".parse::<Namespace>(),
            Err(ParseError::MissingSeparator)
        ));
    }

    #[test]
    fn namespace_display() {
        let ns = Namespace::new("octocat/hello-world".parse().unwrap(), "main".parse().unwrap());
        assert_eq!(ns.to_string(), "octocat/hello-world@main");
        assert_eq!(ns.owner(), "octocat");
        assert_eq!(ns.repo(), "hello-world");
        assert_eq!(ns.branch(), "main");
    }
}
