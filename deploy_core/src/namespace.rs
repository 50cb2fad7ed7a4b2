//! Namespace resolution: a pure function of `(Chart, Environment)`.
//! `Environment` is taken for interface symmetry with the rest of the
//! engine; the rule itself does not currently branch on it.

use deploy_definitions::{Chart, ChartKind, Environment};

const DATABASE: &str = "alt-database";
const AUTH: &str = "alt-auth";
const INGRESS: &str = "alt-ingress";
const APPS: &str = "alt-apps";

/// Resolves the namespace a single-namespace chart deploys into. Callers
/// holding a multi-namespace chart must use `TargetNamespaces[0]` (or the
/// pinned copy from `Chart::pinned_to`) instead of calling this.
pub fn resolve(chart: &Chart, _environment: Environment) -> &'static str {
    if chart.multi_namespace {
        // Multi-namespace charts are resolved via their own target list,
        // never this rule; callers should not reach here for them, but
        // fail safe into the kind-based fallback rather than panic.
        return fallback_by_kind(chart.kind);
    }

    match chart.name.as_str() {
        "postgres" | "clickhouse" | "meilisearch" => DATABASE,
        "auth-postgres" | "kratos-postgres" | "kratos" | "auth-service" => AUTH,
        "nginx" | "nginx-external" => INGRESS,
        "alt-backend" | "alt-frontend" => APPS,
        _ => fallback_by_kind(chart.kind),
    }
}

fn fallback_by_kind(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Operational => APPS,
        ChartKind::Infrastructure | ChartKind::Application => APPS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_definitions::ChartKind;

    fn chart(name: &str, kind: ChartKind) -> Chart {
        Chart {
            name: name.to_string(),
            kind,
            path: "/charts/x".to_string(),
            wait_ready: false,
            multi_namespace: false,
            target_namespaces: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn named_database_charts_resolve_to_alt_database() {
        for name in ["postgres", "clickhouse", "meilisearch"] {
            let c = chart(name, ChartKind::Infrastructure);
            assert_eq!(resolve(&c, Environment::Production), "alt-database");
        }
    }

    #[test]
    fn named_auth_charts_resolve_to_alt_auth() {
        for name in ["auth-postgres", "kratos-postgres", "kratos", "auth-service"] {
            let c = chart(name, ChartKind::Application);
            assert_eq!(resolve(&c, Environment::Staging), "alt-auth");
        }
    }

    #[test]
    fn ingress_charts_resolve_to_alt_ingress() {
        let c = chart("nginx-external", ChartKind::Infrastructure);
        assert_eq!(resolve(&c, Environment::Development), "alt-ingress");
    }

    #[test]
    fn unknown_name_falls_back_to_kind_based_apps() {
        let c = chart("some-new-service", ChartKind::Operational);
        assert_eq!(resolve(&c, Environment::Production), "alt-apps");
        let c2 = chart("some-new-service", ChartKind::Application);
        assert_eq!(resolve(&c2, Environment::Production), "alt-apps");
    }

    #[test]
    fn resolution_is_pure_same_inputs_same_output() {
        let c = chart("postgres", ChartKind::Infrastructure);
        let a = resolve(&c, Environment::Production);
        let b = resolve(&c, Environment::Production);
        assert_eq!(a, b);
    }
}
