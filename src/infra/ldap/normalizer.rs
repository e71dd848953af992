//! Pure mapping from raw directory entries to [`DirectoryIdentity`] values.

use std::collections::HashMap;

use ldap3::SearchEntry;

use crate::domain::types::DirectoryIdentity;

pub const ACCOUNT_NAME_ATTRIBUTE: &str = "sAMAccountName";
pub const MAIL_ATTRIBUTE: &str = "mail";
pub const PRINCIPAL_NAME_ATTRIBUTE: &str = "userPrincipalName";
pub const DISPLAY_NAME_ATTRIBUTE: &str = "displayName";
pub const COMMON_NAME_ATTRIBUTE: &str = "cn";

/// Attributes requested from the directory for every user entry.
pub const USER_ATTRIBUTES: [&str; 5] = [
    ACCOUNT_NAME_ATTRIBUTE,
    MAIL_ATTRIBUTE,
    PRINCIPAL_NAME_ATTRIBUTE,
    DISPLAY_NAME_ATTRIBUTE,
    COMMON_NAME_ATTRIBUTE,
];

/// Built-in accounts that must never be provisioned, matched as a
/// case-insensitive substring of the account name.
const SYSTEM_ACCOUNT_MARKERS: [&str; 3] = ["krbtgt", "guest", "defaultaccount"];

/// Converts one entry's attribute bag into a [`DirectoryIdentity`], or
/// `None` when the entry must be skipped. Multi-valued attributes
/// contribute only their first value.
///
/// Skipped entries: no account name, machine accounts (trailing `$`) and
/// built-in system accounts.
pub fn normalize_entry(
    attributes: &HashMap<String, Vec<String>>,
    base_dn: &str,
) -> Option<DirectoryIdentity> {
    let account_name = first_value(attributes, ACCOUNT_NAME_ATTRIBUTE)?;
    if account_name.ends_with('$') {
        return None;
    }
    let lowercase_name = account_name.to_lowercase();
    if SYSTEM_ACCOUNT_MARKERS
        .iter()
        .any(|marker| lowercase_name.contains(marker))
    {
        return None;
    }

    let email = first_value(attributes, MAIL_ATTRIBUTE)
        .or_else(|| first_value(attributes, PRINCIPAL_NAME_ATTRIBUTE))
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{}@{}", account_name, domain_from_base_dn(base_dn)));
    let display_name = first_value(attributes, DISPLAY_NAME_ATTRIBUTE)
        .or_else(|| first_value(attributes, COMMON_NAME_ATTRIBUTE))
        .unwrap_or(account_name)
        .to_owned();

    Some(DirectoryIdentity {
        account_name: account_name.to_owned(),
        email,
        display_name,
    })
}

/// Maps a settled search result to identities, dropping skipped entries.
pub fn normalize_entries(entries: &[SearchEntry], base_dn: &str) -> Vec<DirectoryIdentity> {
    entries
        .iter()
        .filter_map(|entry| normalize_entry(&entry.attrs, base_dn))
        .collect()
}

/// Joins the `DC=` components of a distinguished name into a DNS-style
/// domain, e.g. `OU=Staff,DC=acme,DC=com` into `acme.com`.
pub fn domain_from_base_dn(base_dn: &str) -> String {
    base_dn
        .split(',')
        .map(str::trim)
        .filter_map(|component| {
            component
                .split_once('=')
                .filter(|(key, _)| key.eq_ignore_ascii_case("dc"))
                .map(|(_, value)| value)
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn first_value<'a>(attributes: &'a HashMap<String, Vec<String>>, name: &str) -> Option<&'a str> {
    attributes
        .get(name)
        .and_then(|values| values.first())
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE_DN: &str = "DC=acme,DC=com";

    fn entry(attributes: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        attributes
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|value| value.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_plain_user_entry() {
        let identity = normalize_entry(
            &entry(&[
                ("sAMAccountName", &["jdoe"]),
                ("mail", &["jdoe@acme.com"]),
                ("displayName", &["John Doe"]),
            ]),
            BASE_DN,
        )
        .unwrap();
        assert_eq!(
            identity,
            DirectoryIdentity {
                account_name: "jdoe".to_owned(),
                email: "jdoe@acme.com".to_owned(),
                display_name: "John Doe".to_owned(),
            }
        );
    }

    #[test]
    fn test_machine_account_is_skipped() {
        let attributes = entry(&[("sAMAccountName", &["WKS01$"])]);
        assert_eq!(normalize_entry(&attributes, BASE_DN), None);
    }

    #[test]
    fn test_missing_or_empty_account_name_is_skipped() {
        assert_eq!(
            normalize_entry(&entry(&[("mail", &["x@acme.com"])]), BASE_DN),
            None
        );
        assert_eq!(
            normalize_entry(&entry(&[("sAMAccountName", &[])]), BASE_DN),
            None
        );
        assert_eq!(
            normalize_entry(&entry(&[("sAMAccountName", &[""])]), BASE_DN),
            None
        );
    }

    #[test]
    fn test_system_accounts_are_skipped() {
        for name in ["krbtgt", "KRBTGT", "Guest", "SvcGuest", "DefaultAccount0"] {
            let attributes = entry(&[("sAMAccountName", &[name])]);
            assert_eq!(normalize_entry(&attributes, BASE_DN), None, "{}", name);
        }
    }

    #[test]
    fn test_email_prefers_mail_over_principal_name() {
        let identity = normalize_entry(
            &entry(&[
                ("sAMAccountName", &["jdoe"]),
                ("mail", &["primary@acme.com"]),
                ("userPrincipalName", &["jdoe@corp.acme.com"]),
            ]),
            BASE_DN,
        )
        .unwrap();
        assert_eq!(identity.email, "primary@acme.com");
    }

    #[test]
    fn test_email_falls_back_to_principal_name() {
        let identity = normalize_entry(
            &entry(&[
                ("sAMAccountName", &["jdoe"]),
                ("userPrincipalName", &["jdoe@corp.acme.com"]),
            ]),
            BASE_DN,
        )
        .unwrap();
        assert_eq!(identity.email, "jdoe@corp.acme.com");
    }

    #[test]
    fn test_email_is_synthesized_from_base_dn() {
        let identity = normalize_entry(
            &entry(&[("sAMAccountName", &["jdoe"])]),
            "OU=Staff,DC=corp,DC=acme,DC=com",
        )
        .unwrap();
        assert_eq!(identity.email, "jdoe@corp.acme.com");
    }

    #[test]
    fn test_display_name_fallback_chain() {
        let from_cn = normalize_entry(
            &entry(&[("sAMAccountName", &["jdoe"]), ("cn", &["John Doe"])]),
            BASE_DN,
        )
        .unwrap();
        assert_eq!(from_cn.display_name, "John Doe");

        let from_account_name =
            normalize_entry(&entry(&[("sAMAccountName", &["jdoe"])]), BASE_DN).unwrap();
        assert_eq!(from_account_name.display_name, "jdoe");
    }

    #[test]
    fn test_multi_valued_attributes_use_first_value() {
        let identity = normalize_entry(
            &entry(&[
                ("sAMAccountName", &["jdoe"]),
                ("mail", &["first@acme.com", "second@acme.com"]),
            ]),
            BASE_DN,
        )
        .unwrap();
        assert_eq!(identity.email, "first@acme.com");
    }

    #[test]
    fn test_domain_from_base_dn() {
        assert_eq!(domain_from_base_dn("DC=acme,DC=com"), "acme.com");
        assert_eq!(domain_from_base_dn("ou=X, dc=Acme, dc=Com"), "Acme.Com");
        assert_eq!(domain_from_base_dn("OU=nowhere"), "");
    }

    #[test]
    fn test_machine_accounts_drop_out_of_a_sweep() {
        let search_entry = |attributes: &[(&str, &[&str])]| SearchEntry {
            dn: String::new(),
            attrs: entry(attributes),
            bin_attrs: HashMap::new(),
        };
        let identities = normalize_entries(
            &[
                search_entry(&[("sAMAccountName", &["jdoe"]), ("mail", &["jdoe@acme.com"])]),
                search_entry(&[("sAMAccountName", &["WKS01$"])]),
            ],
            BASE_DN,
        );
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].email, "jdoe@acme.com");
    }
}
