use secstr::SecUtf8;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    domain::{error::DirectoryError, types::DirectoryIdentity},
    infra::ldap::{
        session::{SessionParams, INTERACTIVE_WATCHDOG},
        DirectorySearcher, UserSearch,
    },
};

/// How many of the sampled users are echoed back to the administrator.
const SAMPLE_USERS_SHOWN: usize = 3;

/// Administrator-supplied connection parameters to validate.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionTestParams {
    pub server_address: String,
    pub domain: String,
    pub admin_username: String,
    pub admin_password: SecUtf8,
    pub port: u16,
    pub use_tls: bool,
}

/// What the administrator sees after a successful test.
#[derive(Debug, Serialize)]
pub struct ConnectionTestReport {
    pub users_count: usize,
    pub sample_users: Vec<DirectoryIdentity>,
    pub base_dn: String,
    pub bind_dn: String,
}

/// Validates connection parameters with one short, bounded session.
/// Reads nothing from and writes nothing to the local store.
pub struct ConnectionTester<Searcher> {
    searcher: Searcher,
}

impl<Searcher: DirectorySearcher> ConnectionTester<Searcher> {
    pub fn new(searcher: Searcher) -> Self {
        Self { searcher }
    }

    #[instrument(skip_all, level = "debug", fields(server = %params.server_address, domain = %params.domain))]
    pub async fn test(
        &self,
        params: ConnectionTestParams,
    ) -> Result<ConnectionTestReport, DirectoryError> {
        let base_dn = base_dn_from_domain(&params.domain);
        let bind_dn = format!("{}@{}", params.admin_username, params.domain);
        let session = SessionParams {
            host: params.server_address,
            port: params.port,
            use_tls: params.use_tls,
            bind_dn: bind_dn.clone(),
            bind_secret: params.admin_password,
            watchdog: INTERACTIVE_WATCHDOG,
        };
        let sweep = self
            .searcher
            .search_users(session, UserSearch::sample(&base_dn))
            .await?;
        let users_count = sweep.identities.len();
        let sample_users = sweep
            .identities
            .into_iter()
            .take(SAMPLE_USERS_SHOWN)
            .collect();
        Ok(ConnectionTestReport {
            users_count,
            sample_users,
            base_dn,
            bind_dn,
        })
    }
}

/// Expands a DNS-style domain into a directory root, e.g. `acme.com`
/// into `DC=acme,DC=com`.
pub fn base_dn_from_domain(domain: &str) -> String {
    domain
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("DC={segment}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::error::ConnectionCause,
        infra::ldap::{DirectorySweep, MockTestDirectorySearcher},
    };
    use pretty_assertions::assert_eq;

    fn params() -> ConnectionTestParams {
        ConnectionTestParams {
            server_address: "dc01.acme.com".to_owned(),
            domain: "acme.com".to_owned(),
            admin_username: "administrator".to_owned(),
            admin_password: SecUtf8::from("hunter2"),
            port: 636,
            use_tls: true,
        }
    }

    fn identity(email: &str) -> DirectoryIdentity {
        DirectoryIdentity {
            account_name: email.split('@').next().unwrap().to_owned(),
            email: email.to_owned(),
            display_name: email.to_owned(),
        }
    }

    #[test]
    fn test_base_dn_from_domain() {
        assert_eq!(base_dn_from_domain("acme.com"), "DC=acme,DC=com");
        assert_eq!(
            base_dn_from_domain("corp.acme.co.uk"),
            "DC=corp,DC=acme,DC=co,DC=uk"
        );
        assert_eq!(base_dn_from_domain("local"), "DC=local");
    }

    #[tokio::test]
    async fn test_successful_test_reports_a_bounded_sample() {
        let mut searcher = MockTestDirectorySearcher::new();
        searcher
            .expect_search_users()
            .withf(|session, search| {
                session.host == "dc01.acme.com"
                    && session.port == 636
                    && session.use_tls
                    && session.bind_dn == "administrator@acme.com"
                    && session.watchdog == INTERACTIVE_WATCHDOG
                    && search.search_base == "DC=acme,DC=com"
                    && search.size_limit == Some(5)
            })
            .times(1)
            .returning(|_, _| {
                Ok(DirectorySweep {
                    identities: vec![
                        identity("a@acme.com"),
                        identity("b@acme.com"),
                        identity("c@acme.com"),
                        identity("d@acme.com"),
                        identity("e@acme.com"),
                    ],
                    truncated: true,
                })
            });

        let report = ConnectionTester::new(searcher).test(params()).await.unwrap();
        assert_eq!(report.users_count, 5);
        assert_eq!(report.sample_users.len(), 3);
        assert_eq!(report.sample_users[0].email, "a@acme.com");
        assert_eq!(report.base_dn, "DC=acme,DC=com");
        assert_eq!(report.bind_dn, "administrator@acme.com");
    }

    #[tokio::test]
    async fn test_failure_surfaces_a_readable_message() {
        let mut searcher = MockTestDirectorySearcher::new();
        searcher.expect_search_users().returning(|_, _| {
            Err(DirectoryError::Connection {
                cause: ConnectionCause::HostNotFound,
                detail: "lookup failed".to_owned(),
            })
        });

        let error = ConnectionTester::new(searcher)
            .test(params())
            .await
            .unwrap_err();
        assert_eq!(
            error.user_message(),
            "Server not found. Check the server address."
        );
    }
}
