//! Distribution families.
//!
//! Every family-specific decision in the crate is an exhaustive `match` on
//! [`Family`]; adding a family means adding a variant and letting the
//! compiler point at each table that needs a row.

use std::fmt;

use super::DistroProfile;

/// Arch derivatives that ship their own mkinitcpio configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchVariant {
    Arch,
    Manjaro,
    BigLinux,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Family {
    Debian,
    Arch(ArchVariant),
    /// Fedora and the RHEL rebuilds.
    Fedora,
    OpenMamba,
    Opensuse,
    Alpine,
    Void,
    Unknown(String),
}

impl Family {
    /// Map a family id (usually `ID_LIKE`'s first token) to a family.
    pub fn from_family_id(family_id: &str) -> Self {
        match family_id.trim().to_ascii_lowercase().as_str() {
            "debian" | "ubuntu" | "linuxmint" | "kali" | "devuan" | "pop" | "neon" => {
                Family::Debian
            }
            "arch" | "archlinux" | "endeavouros" | "garuda" => Family::Arch(ArchVariant::Arch),
            "manjaro" => Family::Arch(ArchVariant::Manjaro),
            "biglinux" | "bigcommunity" => Family::Arch(ArchVariant::BigLinux),
            "fedora" | "rhel" | "centos" | "almalinux" | "rocky" | "ol" => Family::Fedora,
            "openmamba" => Family::OpenMamba,
            "opensuse" | "suse" | "opensuse-leap" | "opensuse-tumbleweed" | "sles" => {
                Family::Opensuse
            }
            "alpine" => Family::Alpine,
            "void" | "voidlinux" => Family::Void,
            other => Family::Unknown(other.to_string()),
        }
    }

    /// Family for a profile. Manjaro-based systems report `ID_LIKE=arch`, so
    /// the Arch variant is refined from the distribution's own id and name.
    pub fn from_profile(profile: &DistroProfile) -> Self {
        match Self::from_family_id(&profile.family_id) {
            Family::Arch(hint) => Family::Arch(arch_variant(profile, hint)),
            other => other,
        }
    }

    /// Families that use `wheel` as the administrative group.
    pub fn admin_group(&self) -> &'static str {
        match self {
            Family::Arch(_) | Family::Fedora | Family::OpenMamba | Family::Opensuse => "wheel",
            Family::Debian | Family::Alpine | Family::Void | Family::Unknown(_) => "sudo",
        }
    }

    /// Families whose account files carry SELinux labels.
    pub fn labels_account_files(&self) -> bool {
        match self {
            Family::Fedora => true,
            Family::Debian
            | Family::Arch(_)
            | Family::OpenMamba
            | Family::Opensuse
            | Family::Alpine
            | Family::Void
            | Family::Unknown(_) => false,
        }
    }
}

fn arch_variant(profile: &DistroProfile, hint: ArchVariant) -> ArchVariant {
    let id = profile.id.to_ascii_lowercase();
    let name = profile.display_name.to_ascii_lowercase();
    if id == "biglinux" || id == "bigcommunity" || name.contains("biglinux") {
        ArchVariant::BigLinux
    } else if id == "manjaro" || name.contains("manjaro") {
        ArchVariant::Manjaro
    } else {
        hint
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Debian => write!(f, "debian"),
            Family::Arch(ArchVariant::Arch) => write!(f, "arch"),
            Family::Arch(ArchVariant::Manjaro) => write!(f, "manjaro"),
            Family::Arch(ArchVariant::BigLinux) => write!(f, "biglinux"),
            Family::Fedora => write!(f, "fedora"),
            Family::OpenMamba => write!(f, "openmamba"),
            Family::Opensuse => write!(f, "opensuse"),
            Family::Alpine => write!(f, "alpine"),
            Family::Void => write!(f, "void"),
            Family::Unknown(id) => write!(f, "unknown ({id})"),
        }
    }
}
