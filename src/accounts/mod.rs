//! In-memory model of the Unix account database of one target root.
//!
//! passwd, shadow and group are parsed into [`entries`]; gshadow, subuid
//! and subgid are kept as raw lines and only filtered by their `name:`
//! prefix. All mutations happen in memory; [`AccountDatabase::save`] writes
//! every file back atomically.
//!
//! There is no locking. A single production per target root is a
//! precondition of the pipeline.

pub mod entries;

pub use entries::{GroupEntry, PasswdEntry, ShadowEntry, FIRST_REGULAR_UID};

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::distro::Family;
use crate::process::{Cmd, CommandRunner};

const PASSWD: &str = "etc/passwd";
const SHADOW: &str = "etc/shadow";
const GROUP: &str = "etc/group";
const GSHADOW: &str = "etc/gshadow";
const SUBUID: &str = "etc/subuid";
const SUBGID: &str = "etc/subgid";

const PASSWD_LABEL: &str = "passwd_file_t";
const SHADOW_LABEL: &str = "shadow_t";

#[derive(Debug, Clone)]
pub struct AccountDatabase {
    root: PathBuf,
    passwd: Vec<PasswdEntry>,
    shadow: Vec<ShadowEntry>,
    group: Vec<GroupEntry>,
    gshadow: Vec<String>,
    subuid: Vec<String>,
    subgid: Vec<String>,
}

impl AccountDatabase {
    /// Read the account files under `root`. Absent files are empty tables,
    /// malformed lines are dropped.
    pub fn load(root: &Path) -> Result<Self> {
        let passwd = read_lines(root, PASSWD)?
            .iter()
            .filter_map(|line| PasswdEntry::parse(line))
            .collect();
        let shadow = read_lines(root, SHADOW)?
            .iter()
            .filter_map(|line| ShadowEntry::parse(line))
            .collect();
        let group = read_lines(root, GROUP)?
            .iter()
            .filter_map(|line| GroupEntry::parse(line))
            .collect();

        Ok(Self {
            root: root.to_path_buf(),
            passwd,
            shadow,
            group,
            gshadow: read_lines(root, GSHADOW)?,
            subuid: read_lines(root, SUBUID)?,
            subgid: read_lines(root, SUBGID)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn users(&self) -> &[PasswdEntry] {
        &self.passwd
    }

    pub fn shadow_entries(&self) -> &[ShadowEntry] {
        &self.shadow
    }

    pub fn groups(&self) -> &[GroupEntry] {
        &self.group
    }

    pub fn user(&self, username: &str) -> Option<&PasswdEntry> {
        self.passwd.iter().find(|u| u.username == username)
    }

    pub fn group(&self, name: &str) -> Option<&GroupEntry> {
        self.group.iter().find(|g| g.name == name)
    }

    /// Usernames with `uid >= threshold`, in file order.
    pub fn regular_usernames(&self, threshold: u32) -> Vec<String> {
        self.passwd
            .iter()
            .filter(|u| u.uid >= threshold)
            .map(|u| u.username.clone())
            .collect()
    }

    /// Add `entry` with a freshly hashed password.
    ///
    /// Any existing account of the same name is removed first, so calling
    /// this twice leaves exactly one passwd, shadow and primary group entry.
    pub fn add_user(&mut self, entry: PasswdEntry, cleartext: &str) -> Result<()> {
        self.remove_user(&entry.username);

        let hash = hash_password(cleartext)?;
        let username = entry.username.clone();
        let (uid, gid) = (entry.uid, entry.gid);

        self.passwd.push(entry);
        self.shadow.push(ShadowEntry::new(&username, hash));
        if self.group(&username).is_none() {
            self.group.push(GroupEntry::new(&username, gid));
        }
        self.gshadow.push(format!("{username}:!::"));

        if uid >= FIRST_REGULAR_UID {
            let line = format!(
                "{username}:{}:{}",
                entries::subordinate_start(uid),
                entries::SUBORDINATE_RANGE
            );
            self.subuid.push(line.clone());
            self.subgid.push(line);
        }
        Ok(())
    }

    /// Remove `username` from every table, including group memberships and
    /// the group of the same name.
    pub fn remove_user(&mut self, username: &str) {
        self.passwd.retain(|u| u.username != username);
        self.shadow.retain(|s| s.username != username);
        self.group.retain(|g| g.name != username);
        for group in &mut self.group {
            group.members.retain(|m| m != username);
        }

        let prefix = format!("{username}:");
        for table in [&mut self.gshadow, &mut self.subuid, &mut self.subgid] {
            table.retain(|line| !line.starts_with(&prefix));
        }
    }

    /// Append `username` to the members of `group_name`.
    ///
    /// Returns `false` and changes nothing when the group does not exist
    /// (no `lpadmin` on a host without CUPS).
    pub fn add_user_to_group(&mut self, username: &str, group_name: &str) -> bool {
        match self.group.iter_mut().find(|g| g.name == group_name) {
            Some(group) => {
                if !group.has_member(username) {
                    group.members.push(username.to_string());
                }
                true
            }
            None => {
                tracing::debug!("group '{}' absent, '{}' not added", group_name, username);
                false
            }
        }
    }

    /// Rehash the password of `username`.
    ///
    /// Returns `Ok(false)` and changes nothing when the user has no shadow
    /// entry.
    pub fn set_password(&mut self, username: &str, cleartext: &str) -> Result<bool> {
        let Some(entry) = self.shadow.iter_mut().find(|s| s.username == username) else {
            tracing::debug!("no shadow entry for '{}', password unchanged", username);
            return Ok(false);
        };
        entry.hash = hash_password(cleartext)?;
        entry.last_change = ShadowEntry::LAST_CHANGE.to_string();
        Ok(true)
    }

    /// Write every table back under the root.
    ///
    /// Raw tables are only written when they have lines or the file already
    /// exists. On Fedora-family hosts each written file is relabelled with
    /// `chcon`; labelling failures are logged and ignored.
    pub fn save(&self, family: &Family, runner: &dyn CommandRunner) -> Result<()> {
        let files: [(&str, String, u32, &str); 3] = [
            (PASSWD, join_lines(&self.passwd), 0o644, PASSWD_LABEL),
            (SHADOW, join_lines(&self.shadow), 0o600, SHADOW_LABEL),
            (GROUP, join_lines(&self.group), 0o644, PASSWD_LABEL),
        ];
        let raw: [(&str, &[String], u32, &str); 3] = [
            (GSHADOW, &self.gshadow, 0o600, SHADOW_LABEL),
            (SUBUID, &self.subuid, 0o644, PASSWD_LABEL),
            (SUBGID, &self.subgid, 0o644, PASSWD_LABEL),
        ];

        let mut written = Vec::new();
        for (relative, content, mode, label) in files {
            written.push((self.write_atomic(relative, &content, mode)?, label));
        }
        for (relative, lines, mode, label) in raw {
            if lines.is_empty() && !self.root.join(relative).exists() {
                continue;
            }
            written.push((self.write_atomic(relative, &join_lines(lines), mode)?, label));
        }

        if family.labels_account_files() {
            for (path, label) in &written {
                relabel(path, label, runner);
            }
        }
        Ok(())
    }

    fn write_atomic(&self, relative: &str, content: &str, mode: u32) -> Result<PathBuf> {
        let path = self.root.join(relative);
        let dir = path
            .parent()
            .ok_or_else(|| anyhow!("account file has no parent: {}", path.display()))?;
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{file_name}.live-remaster.tmp"));

        fs::write(&tmp, content).with_context(|| format!("writing {}", tmp.display()))?;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))
            .with_context(|| format!("setting mode {:o} on {}", mode, tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("replacing {} with {}", path.display(), tmp.display()))?;
        Ok(path)
    }
}

fn read_lines(root: &Path, relative: &str) -> Result<Vec<String>> {
    let path = root.join(relative);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

fn join_lines<T: ToString>(items: &[T]) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str(&item.to_string());
        out.push('\n');
    }
    out
}

fn hash_password(cleartext: &str) -> Result<String> {
    sha_crypt::sha512_simple(cleartext, &sha_crypt::Sha512Params::default())
        .map_err(|err| anyhow!("hashing password: {:?}", err))
}

fn relabel(path: &Path, label: &str, runner: &dyn CommandRunner) {
    let outcome = Cmd::new("chcon")
        .args(["-t", label])
        .arg_path(path)
        .run_with(runner);
    if let Err(err) = outcome {
        tracing::warn!("could not relabel {} as {}: {:#}", path.display(), label, err);
    }
}
