//! Credential Provisioner.
//!
//! A static table enumerates the credential objects each chart needs and
//! which of them this component may generate itself. Generation is routed
//! by chart class (web/database/application) since the shape of a
//! generated secret differs: a database gets a password, a web service
//! gets an API key, a generic application gets a shared secret token.

use std::collections::BTreeMap;
use std::sync::Arc;

use deploy_definitions::{DeployErrorKind, Result};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::adapters::cluster::SecretSpec;
use crate::adapters::ClusterAdapter;
use crate::clock::Ctx;

/// Namespaces consulted for the "absent here but present elsewhere" warning —
/// the fixed alternative set this engine knows about.
const ALT_NAMESPACES: &[&str] = &["alt-apps", "alt-auth", "alt-database", "alt-ingress", "alt-search"];

const OWNERSHIP_CONFLICT_PATTERNS: &[&str] =
    &["managed by helm", "ownership conflict", "cannot patch resource", "forbidden", "access denied"];

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ChartClass {
    Web,
    Database,
    Application,
}

#[derive(Clone, Copy, Debug)]
pub struct CredentialRequirement {
    pub secret_name: &'static str,
    pub auto_generatable: bool,
}

/// The static credential table. Restricted to the charts this engine
/// actually knows by name; an unlisted chart has no required credentials.
fn required_credentials(chart_name: &str) -> (ChartClass, &'static [CredentialRequirement]) {
    match chart_name {
        "postgres" => (ChartClass::Database, &[CredentialRequirement { secret_name: "postgres-credentials", auto_generatable: true }]),
        "auth-postgres" => (ChartClass::Database, &[CredentialRequirement { secret_name: "auth-postgres-credentials", auto_generatable: true }]),
        "kratos-postgres" => (ChartClass::Database, &[CredentialRequirement { secret_name: "kratos-postgres-credentials", auto_generatable: true }]),
        "clickhouse" => (ChartClass::Database, &[CredentialRequirement { secret_name: "clickhouse-credentials", auto_generatable: true }]),
        "meilisearch" => (ChartClass::Database, &[CredentialRequirement { secret_name: "meilisearch-master-key", auto_generatable: true }]),
        "common-ssl" => (ChartClass::Web, &[CredentialRequirement { secret_name: "common-ssl-secret-key", auto_generatable: false }]),
        "kratos" | "auth-service" => (ChartClass::Web, &[CredentialRequirement { secret_name: "auth-service-credentials", auto_generatable: true }]),
        _ => (ChartClass::Application, &[]),
    }
}

fn is_ownership_conflict(message: &str) -> bool {
    let lower = message.to_lowercase();
    OWNERSHIP_CONFLICT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Opaque recovery hook for an external component to "adopt" a conflicting
/// secret so a subsequent create can succeed. Default provisioning passes a
/// no-op; the coordinator may supply a real one.
pub type AdoptCredentials = dyn Fn(&Ctx, &str, &str) -> Result<()> + Send + Sync;

pub fn no_op_adopt() -> Box<AdoptCredentials> {
    Box::new(|_ctx, namespace, name| {
        debug!("no-op credential adoption for {}/{}", namespace, name);
        Ok(())
    })
}

pub struct CredentialProvisioner {
    cluster: Arc<dyn ClusterAdapter>,
}

impl CredentialProvisioner {
    pub fn new(cluster: Arc<dyn ClusterAdapter>) -> Self {
        CredentialProvisioner { cluster }
    }

    /// Validates and, where possible, provisions every credential object
    /// `chart_name` requires in `namespace`. `auto_fix` gates whether an
    /// ownership conflict is retried via `adopt`.
    pub fn validate_and_provision(&self, ctx: &Ctx, chart_name: &str, namespace: &str, auto_fix: bool, adopt: &AdoptCredentials) -> Result<()> {
        let (class, requirements) = required_credentials(chart_name);
        for req in requirements {
            self.provision_one(ctx, namespace, class, req, auto_fix, adopt)?;
        }
        Ok(())
    }

    fn provision_one(&self, ctx: &Ctx, namespace: &str, class: ChartClass, req: &CredentialRequirement, auto_fix: bool, adopt: &AdoptCredentials) -> Result<()> {
        if self.cluster.get_secret(ctx, namespace, req.secret_name)?.is_some() {
            return Ok(());
        }

        for alt in ALT_NAMESPACES.iter().filter(|&&ns| ns != namespace) {
            if self.cluster.get_secret(ctx, alt, req.secret_name)?.is_some() {
                warn!(
                    "credential '{}' absent in expected namespace '{}' but present in '{}'",
                    req.secret_name, namespace, alt
                );
                break;
            }
        }

        if !req.auto_generatable {
            return Err(DeployErrorKind::MissingPrerequisite(format!(
                "credential '{}' is missing in namespace '{}' and cannot be auto-generated",
                req.secret_name, namespace
            ))
            .into());
        }

        let secret = SecretSpec {
            name: req.secret_name.to_string(),
            namespace: namespace.to_string(),
            data: generate_secret_data(class),
            labels: BTreeMap::new(),
        };

        match self.cluster.create_secret(ctx, &secret) {
            Ok(()) => Ok(()),
            Err(e) if is_ownership_conflict(&e.to_string()) => {
                warn!("ownership conflict creating '{}' in '{}': {}", req.secret_name, namespace, e);
                if !auto_fix {
                    return Err(DeployErrorKind::OwnershipConflict(format!("{}/{}", namespace, req.secret_name)).into());
                }
                adopt(ctx, namespace, req.secret_name)?;
                self.cluster.create_secret(ctx, &secret)
            }
            Err(e) => Err(e),
        }
    }
}

fn generate_secret_data(class: ChartClass) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    match class {
        ChartClass::Database => {
            data.insert("password".to_string(), random_token(32));
        }
        ChartClass::Web => {
            data.insert("api-key".to_string(), random_token(40));
        }
        ChartClass::Application => {
            data.insert("shared-secret".to_string(), random_token(32));
        }
    }
    data
}

fn random_token(len: usize) -> String {
    thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::testing::FakeClusterAdapter;

    fn ctx() -> Ctx {
        Ctx::background(Arc::new(SystemClock))
    }

    #[test]
    fn existing_credential_is_left_alone() {
        let cluster = Arc::new(FakeClusterAdapter::new());
        cluster.set_secret("alt-database", "postgres-credentials", BTreeMap::new());
        let provisioner = CredentialProvisioner::new(cluster.clone());
        provisioner.validate_and_provision(&ctx(), "postgres", "alt-database", false, &no_op_adopt()).unwrap();
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn missing_auto_generatable_credential_is_created() {
        let cluster = Arc::new(FakeClusterAdapter::new());
        let provisioner = CredentialProvisioner::new(cluster.clone());
        provisioner.validate_and_provision(&ctx(), "postgres", "alt-database", false, &no_op_adopt()).unwrap();
        assert!(cluster.calls().iter().any(|c| c.contains("postgres-credentials")));
    }

    #[test]
    fn missing_non_generatable_credential_fails_with_missing_prerequisite() {
        let cluster = Arc::new(FakeClusterAdapter::new());
        let provisioner = CredentialProvisioner::new(cluster);
        let err = provisioner.validate_and_provision(&ctx(), "common-ssl", "alt-apps", false, &no_op_adopt()).unwrap_err();
        assert!(err.downcast_ref::<DeployErrorKind>().map(|k| matches!(k, DeployErrorKind::MissingPrerequisite(_))).unwrap_or(false));
    }

    #[test]
    fn unknown_chart_needs_no_credentials() {
        let cluster = Arc::new(FakeClusterAdapter::new());
        let provisioner = CredentialProvisioner::new(cluster.clone());
        provisioner.validate_and_provision(&ctx(), "webapp", "alt-apps", false, &no_op_adopt()).unwrap();
        assert!(cluster.calls().is_empty());
    }
}
