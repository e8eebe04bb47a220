//! Line formats of the account files.
//!
//! Parsers return `None` for malformed lines so a damaged file degrades to
//! "that line is gone" instead of failing the whole load.

use std::fmt;

/// Threshold separating regular accounts from system accounts.
pub const FIRST_REGULAR_UID: u32 = 1000;

/// `/etc/passwd` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub username: String,
    pub password_placeholder: String,
    pub uid: u32,
    pub gid: u32,
    pub comment: String,
    pub home: String,
    pub shell: String,
}

impl PasswdEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 7 {
            return None;
        }
        Some(Self {
            username: fields[0].to_string(),
            password_placeholder: fields[1].to_string(),
            uid: fields[2].trim().parse().ok()?,
            gid: fields[3].trim().parse().ok()?,
            comment: fields[4].to_string(),
            home: fields[5].to_string(),
            shell: fields[6].to_string(),
        })
    }

    pub fn is_regular(&self) -> bool {
        self.uid >= FIRST_REGULAR_UID
    }
}

impl fmt::Display for PasswdEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}",
            self.username,
            self.password_placeholder,
            self.uid,
            self.gid,
            self.comment,
            self.home,
            self.shell
        )
    }
}

/// `/etc/shadow` line. Aging fields are kept verbatim (they may be empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowEntry {
    pub username: String,
    pub hash: String,
    pub last_change: String,
    pub min: String,
    pub max: String,
    pub warn: String,
    pub inactive: String,
    pub expire: String,
}

impl ShadowEntry {
    /// Reference day written on every password change.
    pub const LAST_CHANGE: &'static str = "19700";

    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 2 {
            return None;
        }
        let field = |i: usize| fields.get(i).copied().unwrap_or_default().to_string();
        Some(Self {
            username: field(0),
            hash: field(1),
            last_change: field(2),
            min: field(3),
            max: field(4),
            warn: field(5),
            inactive: field(6),
            expire: field(7),
        })
    }

    pub fn new(username: &str, hash: String) -> Self {
        Self {
            username: username.to_string(),
            hash,
            last_change: Self::LAST_CHANGE.to_string(),
            min: "0".to_string(),
            max: "99999".to_string(),
            warn: "7".to_string(),
            inactive: String::new(),
            expire: String::new(),
        }
    }
}

impl fmt::Display for ShadowEntry {
    // The reserved ninth field is always empty, hence the trailing colon.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}:{}:",
            self.username,
            self.hash,
            self.last_change,
            self.min,
            self.max,
            self.warn,
            self.inactive,
            self.expire
        )
    }
}

/// `/etc/group` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub password: String,
    pub gid: u32,
    /// Ordered, without duplicates.
    pub members: Vec<String>,
}

impl GroupEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 3 {
            return None;
        }
        let mut members: Vec<String> = Vec::new();
        for member in fields.get(3).copied().unwrap_or_default().split(',') {
            let member = member.trim();
            if !member.is_empty() && !members.iter().any(|m| m == member) {
                members.push(member.to_string());
            }
        }
        Some(Self {
            name: fields[0].to_string(),
            password: fields[1].to_string(),
            gid: fields[2].trim().parse().ok()?,
            members,
        })
    }

    pub fn new(name: &str, gid: u32) -> Self {
        Self {
            name: name.to_string(),
            password: "x".to_string(),
            gid,
            members: Vec::new(),
        }
    }

    pub fn has_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m == username)
    }
}

impl fmt::Display for GroupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.name,
            self.password,
            self.gid,
            self.members.join(",")
        )
    }
}

/// Start of the subordinate id block delegated to `uid`.
///
/// Blocks are [`SUBORDINATE_RANGE`] wide and laid out back to back, so two
/// regular accounts never overlap.
pub fn subordinate_start(uid: u32) -> u64 {
    100_000 + u64::from(uid.saturating_sub(FIRST_REGULAR_UID)) * SUBORDINATE_RANGE
}

pub const SUBORDINATE_RANGE: u64 = 65_536;
