//! Allowlist matching and risk classification (C7).
//!
//! Directly generalizes the teacher's `DANGEROUS_PATTERNS` denylist
//! (`process.rs`) into a positive allowlist (a command must match before it
//! runs at all) plus a closed risk-classification table, in the spirit of
//! `other_examples/.../TheFermiSea-ralph-beads/security.rs`'s
//! `RiskLevel::{Low,Medium,High}` basename/argument pattern tables.

use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::LazyLock;

/// Risk levels are totally ordered by declaration order: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    #[must_use]
    pub fn uplift(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Hardcoded global allowlist patterns (spec §4.1/§4.7), anchored at start.
static GLOBAL_ALLOW_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^/bin/.*",
        r"^/usr/bin/.*",
        r"^/usr/sbin/.*",
        r"^/usr/local/bin/.*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid allowlist pattern"))
    .collect()
});

/// Patterns skippable from verification when `verify_standard_paths` is
/// false. Kept as its own accessor since the set is identical to the
/// allowlist patterns but conceptually serves C1, not C7.
#[must_use]
pub fn is_standard_path(cmd: &str) -> bool {
    GLOBAL_ALLOW_PATTERNS.iter().any(|re| re.is_match(cmd))
}

/// Whether `cmd` matches a hardcoded global pattern or an entry in the
/// group's resolved `cmd_allowed` list.
#[must_use]
pub fn is_allowed(cmd: &str, cmd_allowed: &[std::path::PathBuf]) -> bool {
    if GLOBAL_ALLOW_PATTERNS.iter().any(|re| re.is_match(cmd)) {
        return true;
    }
    cmd_allowed.iter().any(|p| p.as_os_str() == cmd)
}

struct BasenameRule {
    names: &'static [&'static str],
    base: RiskLevel,
    /// If any of these substrings appear (joined, space-separated) in the
    /// argv tail, the base risk is upgraded to `escalated`.
    escalate_if: &'static [&'static str],
    escalated: RiskLevel,
}

const BASENAME_RULES: &[BasenameRule] = &[
    BasenameRule {
        names: &["rm"],
        base: RiskLevel::Medium,
        escalate_if: &["-rf", "-fr", "--recursive --force", "--force --recursive", "-r -f", "-f -r"],
        escalated: RiskLevel::High,
    },
    BasenameRule {
        names: &["dd"],
        base: RiskLevel::Medium,
        escalate_if: &["of=/dev", "of="],
        escalated: RiskLevel::High,
    },
    BasenameRule {
        names: &["mkfs", "shutdown", "reboot", "halt", "poweroff", "init"],
        base: RiskLevel::High,
        escalate_if: &[],
        escalated: RiskLevel::High,
    },
    BasenameRule {
        names: &["chmod", "chown"],
        base: RiskLevel::Low,
        escalate_if: &["-R", "--recursive"],
        escalated: RiskLevel::High,
    },
    BasenameRule {
        names: &["mount", "umount"],
        base: RiskLevel::Medium,
        escalate_if: &[],
        escalated: RiskLevel::Medium,
    },
    BasenameRule {
        names: &["apt", "apt-get", "yum", "dnf", "pacman", "brew", "pip", "pip3", "npm", "cargo"],
        base: RiskLevel::Medium,
        escalate_if: &[],
        escalated: RiskLevel::Medium,
    },
];

const ARGUMENT_UPLIFT_PATTERNS: &[&str] =
    &["-rf", "-fr", "--recursive --force", "--force --recursive"];

const NETWORK_TOOLS: &[&str] = &[
    "curl", "wget", "nc", "ncat", "ssh", "scp", "rsync", "ftp", "sftp",
];

/// Compute the risk level of a resolved `cmd` path with its `args`.
#[must_use]
pub fn classify(cmd: &str, args: &[String]) -> RiskLevel {
    let basename = Path::new(cmd)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(cmd);
    let joined_args = args.join(" ");

    let mut risk = RiskLevel::Low;

    if let Some(rule) = BASENAME_RULES.iter().find(|r| r.names.contains(&basename)) {
        let mut r = rule.base;
        if rule
            .escalate_if
            .iter()
            .any(|pat| joined_args.contains(pat) || args.iter().any(|a| a == pat))
        {
            r = rule.escalated;
        }
        risk = risk.max(r);
    }

    if ARGUMENT_UPLIFT_PATTERNS
        .iter()
        .any(|pat| joined_args.contains(pat))
    {
        risk = risk.max(RiskLevel::High);
    }

    if NETWORK_TOOLS.contains(&basename) {
        risk = risk.max(RiskLevel::Medium);
    }

    risk
}

/// Apply the privilege-change uplift (spec §4.7) when `run_as_user` or
/// `run_as_group` is set.
#[must_use]
pub fn with_privilege_uplift(risk: RiskLevel, changes_identity: bool) -> RiskLevel {
    if changes_identity {
        risk.uplift()
    } else {
        risk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rm_rf_is_high_risk() {
        let risk = classify("/bin/rm", &["-rf".into(), "/tmp/x".into()]);
        assert_eq!(risk, RiskLevel::High);
    }

    #[test]
    fn plain_rm_is_medium() {
        let risk = classify("/bin/rm", &["/tmp/x".into()]);
        assert_eq!(risk, RiskLevel::Medium);
    }

    #[test]
    fn ls_is_low() {
        assert_eq!(classify("/bin/ls", &["-la".into()]), RiskLevel::Low);
    }

    #[test]
    fn curl_floors_medium() {
        assert_eq!(
            classify("/usr/bin/curl", &["https://example.com".into()]),
            RiskLevel::Medium
        );
    }

    #[test]
    fn privilege_uplift_caps_at_high() {
        assert_eq!(with_privilege_uplift(RiskLevel::High, true), RiskLevel::High);
        assert_eq!(with_privilege_uplift(RiskLevel::Low, true), RiskLevel::Medium);
    }

    #[test]
    fn risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }

    #[test]
    fn global_patterns_allow_standard_paths() {
        assert!(is_allowed("/bin/ls", &[]));
        assert!(is_allowed("/usr/local/bin/tool", &[]));
        assert!(!is_allowed("/opt/app/bin/tool", &[]));
    }

    #[test]
    fn cmd_allowed_entry_permits_nonstandard_path() {
        let allowed = vec![std::path::PathBuf::from("/opt/app/bin/tool")];
        assert!(is_allowed("/opt/app/bin/tool", &allowed));
    }
}
