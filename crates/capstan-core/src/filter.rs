//! The filter chain deciding which index entries stay out of the mirror.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

/// One skip rule: a regex, an arbitrary predicate, or a disjunction of
/// further rules. A single recursive matcher handles all three, so call
/// sites never inspect the shape.
#[derive(Clone)]
pub enum Rule {
    Pattern(Regex),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
    Any(Vec<Rule>),
}

impl Rule {
    /// Compile a regex rule; the pattern is validated here, at
    /// configuration time, not on first use.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Rule::Pattern)
            .map_err(|source| Error::FilterPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Rule::Predicate(Arc::new(f))
    }

    pub fn any(rules: impl IntoIterator<Item = Rule>) -> Self {
        Rule::Any(rules.into_iter().collect())
    }

    /// Recursive-descent match; `Any` ORs its members and stops at the
    /// first hit.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Rule::Pattern(re) => re.is_match(candidate),
            Rule::Predicate(f) => f(candidate),
            Rule::Any(rules) => rules.iter().any(|rule| rule.matches(candidate)),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Pattern(re) => write!(f, "Pattern({:?})", re.as_str()),
            Rule::Predicate(_) => f.write_str("Predicate(..)"),
            Rule::Any(rules) => f.debug_tuple("Any").field(rules).finish(),
        }
    }
}

/// Paths of the perl language distribution itself and its known
/// embeddings and forks. Anchored at a path segment (`/name-digit`), so
/// modules whose names merely contain "perl" pass through.
const PERL_DIST_PATTERNS: [&str; 5] = [
    r"(?i)/(?:emb|syb|bio)?perl-\d",
    r"(?i)/(?:parrot|ponie)-\d",
    r"(?i)/(?:kurila)-\d",
    r"(?i)/\bperl-?5\.004",
    r"(?i)/\bperl_mlb\.zip",
];

static PERL_DIST: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PERL_DIST_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("built-in pattern"))
        .collect()
});

/// The configured filter chain, evaluated once per index entry.
#[derive(Clone, Debug, Default)]
pub struct Filters {
    pub skip_perl: bool,
    pub path_rules: Vec<Rule>,
    pub module_rules: Vec<Rule>,
}

impl Filters {
    /// Decide whether `(module, path)` is excluded from the mirror.
    ///
    /// Evaluation order is fixed: the perl-distribution skip list, then
    /// path rules, then module rules. The first match wins; later rules
    /// are not consulted.
    pub fn skip(&self, module: &str, path: &str) -> bool {
        if self.skip_perl && PERL_DIST.iter().any(|re| re.is_match(path)) {
            debug!(path, "skipping perl distribution");
            return true;
        }
        if let Some(rule) = self.path_rules.iter().find(|rule| rule.matches(path)) {
            debug!(path, ?rule, "path excluded by filter");
            return true;
        }
        if let Some(rule) = self.module_rules.iter().find(|rule| rule.matches(module)) {
            debug!(module, ?rule, "module excluded by filter");
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perl_only() -> Filters {
        Filters {
            skip_perl: true,
            ..Filters::default()
        }
    }

    #[test]
    fn skips_perl_distributions() {
        let filters = perl_only();
        for path in [
            "R/RJ/RJBS/perl-5.36.0.tar.gz",
            "N/NW/NWCLARK/embperl-2.5.0.tar.gz",
            "S/SB/SBECK/Parrot-4.9.0.tar.gz",
            "G/GB/GBARR/kurila-1.19.tar.gz",
            "C/CH/CHIPS/perl5.004_04.tar.gz",
            "A/AD/ADMIN/perl_mlb.zip",
        ] {
            assert!(filters.skip("Some::Module", path), "expected skip: {path}");
        }
    }

    #[test]
    fn keeps_modules_that_merely_mention_perl() {
        let filters = perl_only();
        for path in [
            "D/DC/DCONWAY/Lingua-Romana-Perligata-0.6.tar.gz",
            "P/PE/PERLER/Some-Dist-1.0.tar.gz",
            "M/MY/MYAUTHOR/perlish-helpers-2.1.tar.gz",
        ] {
            assert!(!filters.skip("Some::Module", path), "expected keep: {path}");
        }
    }

    #[test]
    fn perl_skip_wins_over_permissive_custom_rule() {
        // A predicate that matches nothing "allows" everything; the
        // language skip is evaluated first and still rejects.
        let filters = Filters {
            skip_perl: true,
            path_rules: vec![Rule::predicate(|_| false)],
            ..Filters::default()
        };
        assert!(filters.skip("perl", "R/RJ/RJBS/perl-5.36.0.tar.gz"));
    }

    #[test]
    fn path_rules_match_paths() -> Result<()> {
        let filters = Filters {
            path_rules: vec![Rule::pattern(r"^O/OP/")?],
            ..Filters::default()
        };
        assert!(filters.skip("B", "O/OP/OPRIME/B-2.0.tar.gz"));
        assert!(!filters.skip("A", "X/XY/XYZZY/A-1.0.tar.gz"));
        Ok(())
    }

    #[test]
    fn module_rules_match_module_names() -> Result<()> {
        let filters = Filters {
            module_rules: vec![Rule::pattern(r"^Acme::")?],
            ..Filters::default()
        };
        assert!(filters.skip("Acme::Wabby", "X/XY/XYZZY/Acme-Wabby-1.0.tar.gz"));
        assert!(!filters.skip("App::Wabby", "X/XY/XYZZY/App-Wabby-1.0.tar.gz"));
        Ok(())
    }

    #[test]
    fn predicates_and_disjunctions() -> Result<()> {
        let rule = Rule::any([
            Rule::pattern(r"^Dev::")?,
            Rule::predicate(|m| m.ends_with("::Test")),
        ]);
        assert!(rule.matches("Dev::Tool"));
        assert!(rule.matches("My::Test"));
        assert!(!rule.matches("My::Lib"));
        Ok(())
    }

    #[test]
    fn empty_chain_keeps_everything() {
        let filters = Filters::default();
        assert!(!filters.skip("perl", "R/RJ/RJBS/perl-5.36.0.tar.gz"));
    }
}
