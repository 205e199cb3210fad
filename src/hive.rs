//! Windows registry hive prefixes.
//!
//! Templates spell registry paths several ways (`HKCU:\Console`,
//! `HKEY_CURRENT_USER\Console`, `Registry::HKEY_CURRENT_USER\Console`).
//! [`Hive::split`] recognises all of them so selectors, validation and the
//! `normalize_registry_root` rule agree on what a registry path is.
use std::fmt;

/// A root registry hive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hive {
    /// `HKEY_CURRENT_USER`
    CurrentUser,
    /// `HKEY_LOCAL_MACHINE`
    LocalMachine,
    /// `HKEY_CLASSES_ROOT`
    ClassesRoot,
    /// `HKEY_USERS`
    Users,
    /// `HKEY_CURRENT_CONFIG`
    CurrentConfig,
}

const ALL: [Hive; 5] = [
    Hive::CurrentUser,
    Hive::LocalMachine,
    Hive::ClassesRoot,
    Hive::Users,
    Hive::CurrentConfig,
];

impl Hive {
    /// PowerShell drive spelling, e.g. `HKCU:`.
    #[must_use]
    pub const fn drive(self) -> &'static str {
        match self {
            Self::CurrentUser => "HKCU:",
            Self::LocalMachine => "HKLM:",
            Self::ClassesRoot => "HKCR:",
            Self::Users => "HKU:",
            Self::CurrentConfig => "HKCC:",
        }
    }

    /// Long Win32 spelling, e.g. `HKEY_CURRENT_USER`.
    #[must_use]
    pub const fn long_name(self) -> &'static str {
        match self {
            Self::CurrentUser => "HKEY_CURRENT_USER",
            Self::LocalMachine => "HKEY_LOCAL_MACHINE",
            Self::ClassesRoot => "HKEY_CLASSES_ROOT",
            Self::Users => "HKEY_USERS",
            Self::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }

    /// Split a registry path into its hive and the remaining subkey.
    ///
    /// Matching is case-insensitive. The subkey has no leading separator and
    /// may be empty when the path names the hive itself.
    ///
    /// ```
    /// use config_resolver::hive::Hive;
    ///
    /// assert_eq!(
    ///     Hive::split("HKEY_CURRENT_USER\\Console"),
    ///     Some((Hive::CurrentUser, "Console"))
    /// );
    /// assert_eq!(Hive::split("C:\\Windows"), None);
    /// ```
    #[must_use]
    pub fn split(path: &str) -> Option<(Self, &str)> {
        let path = strip_prefix_ci(path, "Registry::").unwrap_or(path);
        for hive in ALL {
            for prefix in [hive.drive(), hive.long_name(), hive.short_name()] {
                if let Some(rest) = strip_prefix_ci(path, prefix)
                    && (rest.is_empty() || rest.starts_with(['\\', '/']))
                {
                    return Some((hive, rest.trim_start_matches(['\\', '/'])));
                }
            }
        }
        None
    }

    /// Rewrite `path` to the PowerShell drive spelling (`HKCU:\...`).
    #[must_use]
    pub fn normalize(path: &str) -> Option<String> {
        Self::split(path).map(|(hive, rest)| {
            if rest.is_empty() {
                format!("{}\\", hive.drive())
            } else {
                format!("{}\\{rest}", hive.drive())
            }
        })
    }

    const fn short_name(self) -> &'static str {
        match self {
            Self::CurrentUser => "HKCU",
            Self::LocalMachine => "HKLM",
            Self::ClassesRoot => "HKCR",
            Self::Users => "HKU",
            Self::CurrentConfig => "HKCC",
        }
    }
}

impl fmt::Display for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.drive())
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| s.get(prefix.len()..))
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_drive_spelling() {
        assert_eq!(
            Hive::split("HKLM:\\SOFTWARE\\Vendor"),
            Some((Hive::LocalMachine, "SOFTWARE\\Vendor"))
        );
    }

    #[test]
    fn split_is_case_insensitive() {
        assert_eq!(
            Hive::split("hkey_local_machine\\SOFTWARE"),
            Some((Hive::LocalMachine, "SOFTWARE"))
        );
    }

    #[test]
    fn split_provider_qualified_path() {
        assert_eq!(
            Hive::split("Registry::HKEY_USERS\\.DEFAULT"),
            Some((Hive::Users, ".DEFAULT"))
        );
    }

    #[test]
    fn split_short_name_without_colon() {
        assert_eq!(
            Hive::split("HKCU\\Control Panel\\Desktop"),
            Some((Hive::CurrentUser, "Control Panel\\Desktop"))
        );
    }

    #[test]
    fn split_rejects_prefix_of_longer_word() {
        assert_eq!(Hive::split("HKCUX\\Console"), None);
    }

    #[test]
    fn split_hive_only() {
        assert_eq!(Hive::split("HKCC:"), Some((Hive::CurrentConfig, "")));
    }

    #[test]
    fn split_rejects_file_paths() {
        assert_eq!(Hive::split("%APPDATA%\\Code\\User"), None);
    }

    #[test]
    fn normalize_long_spelling() {
        assert_eq!(
            Hive::normalize("HKEY_CURRENT_USER\\Console").as_deref(),
            Some("HKCU:\\Console")
        );
    }

    #[test]
    fn display_uses_drive() {
        assert_eq!(Hive::ClassesRoot.to_string(), "HKCR:");
    }
}
