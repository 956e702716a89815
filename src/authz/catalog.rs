//! Route policy catalog.
//!
//! Each entry pairs an action with a resource template and the getters that
//! may fill the template's placeholders. Protecting a new resource means
//! adding an entry here; the matcher itself never changes.
//!
//! Resources use the dotted form with a trailing delimiter, so
//! `app.*.backup.` covers `app.my-app.backup.` but not
//! `app.my-app.backup.schedules.`.

use std::sync::Arc;

use super::{
    Policy, Role, TemplateError,
    template::{AppIdGetter, BundleKey, Getter, ResourceTemplate, SupportBundleGetter},
};
use crate::store::AppStore;

/// Bumped whenever an entry is added, removed or changes meaning.
pub const CATALOG_VERSION: u32 = 1;

pub const CLUSTER_ADMIN_ROLE_ID: &str = "cluster-admin";

pub const READ: &str = "read";
pub const WRITE: &str = "write";

/// Source of a derived template variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetterKind {
    AppSlugFromAppId,
    AppSlugFromBundleId,
    AppSlugFromBundleSlug,
}

impl GetterKind {
    pub fn build(self, store: Arc<dyn AppStore>) -> Arc<dyn Getter> {
        match self {
            Self::AppSlugFromAppId => Arc::new(AppIdGetter::new(store)),
            Self::AppSlugFromBundleId => {
                Arc::new(SupportBundleGetter::new(store, BundleKey::Id))
            }
            Self::AppSlugFromBundleSlug => {
                Arc::new(SupportBundleGetter::new(store, BundleKey::Slug))
            }
        }
    }
}

/// A protected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub name: &'static str,
    pub action: &'static str,
    pub resource: &'static str,
    pub getters: &'static [GetterKind],
}

impl RoutePolicy {
    const fn new(name: &'static str, action: &'static str, resource: &'static str) -> Self {
        Self {
            name,
            action,
            resource,
            getters: &[],
        }
    }

    const fn with_getters(mut self, getters: &'static [GetterKind]) -> Self {
        self.getters = getters;
        self
    }

    pub fn template(&self) -> Result<ResourceTemplate, TemplateError> {
        ResourceTemplate::parse(self.resource)
    }

    pub fn build_getters(&self, store: &Arc<dyn AppStore>) -> Vec<Arc<dyn Getter>> {
        self.getters
            .iter()
            .map(|kind| kind.build(Arc::clone(store)))
            .collect()
    }
}

const BY_APP_ID: &[GetterKind] = &[GetterKind::AppSlugFromAppId];
const BY_BUNDLE: &[GetterKind] = &[
    GetterKind::AppSlugFromBundleId,
    GetterKind::AppSlugFromBundleSlug,
];

pub const APP_LIST: RoutePolicy = RoutePolicy::new("AppList", READ, "app.");
pub const APP_READ: RoutePolicy =
    RoutePolicy::new("AppRead", READ, "app.{{.appSlug}}.").with_getters(BY_APP_ID);
pub const APP_UPDATE: RoutePolicy =
    RoutePolicy::new("AppUpdate", WRITE, "app.{{.appSlug}}.").with_getters(BY_APP_ID);
pub const APP_STATUS_READ: RoutePolicy =
    RoutePolicy::new("AppStatusRead", READ, "app.{{.appSlug}}.status.").with_getters(BY_APP_ID);

pub const APP_DOWNSTREAM_READ: RoutePolicy =
    RoutePolicy::new("AppDownstreamRead", READ, "app.{{.appSlug}}.downstream.")
        .with_getters(BY_APP_ID);
pub const APP_DOWNSTREAM_LOGS_READ: RoutePolicy = RoutePolicy::new(
    "AppDownstreamLogsRead",
    READ,
    "app.{{.appSlug}}.downstream.logs.",
)
.with_getters(BY_APP_ID);
pub const APP_DOWNSTREAM_FILETREE_READ: RoutePolicy = RoutePolicy::new(
    "AppDownstreamFiletreeRead",
    READ,
    "app.{{.appSlug}}.downstream.filetree.",
)
.with_getters(BY_APP_ID);
pub const APP_DOWNSTREAM_CONFIG_READ: RoutePolicy = RoutePolicy::new(
    "AppDownstreamConfigRead",
    READ,
    "app.{{.appSlug}}.downstream.config.",
)
.with_getters(BY_APP_ID);
pub const APP_DOWNSTREAM_CONFIG_WRITE: RoutePolicy = RoutePolicy::new(
    "AppDownstreamConfigWrite",
    WRITE,
    "app.{{.appSlug}}.downstream.config.",
)
.with_getters(BY_APP_ID);
pub const APP_DOWNSTREAM_PREFLIGHT_READ: RoutePolicy = RoutePolicy::new(
    "AppDownstreamPreflightRead",
    READ,
    "app.{{.appSlug}}.downstream.preflight.",
)
.with_getters(BY_APP_ID);
pub const APP_DOWNSTREAM_PREFLIGHT_WRITE: RoutePolicy = RoutePolicy::new(
    "AppDownstreamPreflightWrite",
    WRITE,
    "app.{{.appSlug}}.downstream.preflight.",
)
.with_getters(BY_APP_ID);

pub const APP_BACKUP_READ: RoutePolicy =
    RoutePolicy::new("AppBackupRead", READ, "app.{{.appSlug}}.backup.").with_getters(BY_APP_ID);
pub const APP_BACKUP_WRITE: RoutePolicy =
    RoutePolicy::new("AppBackupWrite", WRITE, "app.{{.appSlug}}.backup.").with_getters(BY_APP_ID);
pub const APP_RESTORE_READ: RoutePolicy =
    RoutePolicy::new("AppRestoreRead", READ, "app.{{.appSlug}}.restore.").with_getters(BY_APP_ID);
pub const APP_RESTORE_WRITE: RoutePolicy =
    RoutePolicy::new("AppRestoreWrite", WRITE, "app.{{.appSlug}}.restore.")
        .with_getters(BY_APP_ID);

pub const APP_SUPPORTBUNDLE_READ: RoutePolicy = RoutePolicy::new(
    "AppSupportbundleRead",
    READ,
    "app.{{.appSlug}}.supportbundle.",
)
.with_getters(BY_BUNDLE);
pub const APP_SUPPORTBUNDLE_WRITE: RoutePolicy = RoutePolicy::new(
    "AppSupportbundleWrite",
    WRITE,
    "app.{{.appSlug}}.supportbundle.",
)
.with_getters(BY_BUNDLE);

pub const APP_LICENSE_READ: RoutePolicy =
    RoutePolicy::new("AppLicenseRead", READ, "app.{{.appSlug}}.license.").with_getters(BY_APP_ID);
pub const APP_LICENSE_WRITE: RoutePolicy =
    RoutePolicy::new("AppLicenseWrite", WRITE, "app.{{.appSlug}}.license.")
        .with_getters(BY_APP_ID);
pub const APP_GITOPS_READ: RoutePolicy =
    RoutePolicy::new("AppGitopsRead", READ, "app.{{.appSlug}}.gitops.").with_getters(BY_APP_ID);
pub const APP_GITOPS_WRITE: RoutePolicy =
    RoutePolicy::new("AppGitopsWrite", WRITE, "app.{{.appSlug}}.gitops.").with_getters(BY_APP_ID);
pub const APP_REGISTRY_READ: RoutePolicy =
    RoutePolicy::new("AppRegistryRead", READ, "app.{{.appSlug}}.registry.")
        .with_getters(BY_APP_ID);
pub const APP_REGISTRY_WRITE: RoutePolicy =
    RoutePolicy::new("AppRegistryWrite", WRITE, "app.{{.appSlug}}.registry.")
        .with_getters(BY_APP_ID);

pub const REDACTOR_READ: RoutePolicy = RoutePolicy::new("RedactorRead", READ, "redactor.");
pub const REDACTOR_WRITE: RoutePolicy = RoutePolicy::new("RedactorWrite", WRITE, "redactor.");
pub const SNAPSHOT_SETTINGS_READ: RoutePolicy =
    RoutePolicy::new("SnapshotSettingsRead", READ, "snapshot.settings.");
pub const SNAPSHOT_SETTINGS_WRITE: RoutePolicy =
    RoutePolicy::new("SnapshotSettingsWrite", WRITE, "snapshot.settings.");
pub const PROMETHEUS_WRITE: RoutePolicy =
    RoutePolicy::new("PrometheusWrite", WRITE, "prometheussettings.");

pub const ALL: &[RoutePolicy] = &[
    APP_LIST,
    APP_READ,
    APP_UPDATE,
    APP_STATUS_READ,
    APP_DOWNSTREAM_READ,
    APP_DOWNSTREAM_LOGS_READ,
    APP_DOWNSTREAM_FILETREE_READ,
    APP_DOWNSTREAM_CONFIG_READ,
    APP_DOWNSTREAM_CONFIG_WRITE,
    APP_DOWNSTREAM_PREFLIGHT_READ,
    APP_DOWNSTREAM_PREFLIGHT_WRITE,
    APP_BACKUP_READ,
    APP_BACKUP_WRITE,
    APP_RESTORE_READ,
    APP_RESTORE_WRITE,
    APP_SUPPORTBUNDLE_READ,
    APP_SUPPORTBUNDLE_WRITE,
    APP_LICENSE_READ,
    APP_LICENSE_WRITE,
    APP_GITOPS_READ,
    APP_GITOPS_WRITE,
    APP_REGISTRY_READ,
    APP_REGISTRY_WRITE,
    REDACTOR_READ,
    REDACTOR_WRITE,
    SNAPSHOT_SETTINGS_READ,
    SNAPSHOT_SETTINGS_WRITE,
    PROMETHEUS_WRITE,
];

/// Parse every catalog template; the server refuses to start on failure.
pub fn validate() -> Result<(), TemplateError> {
    for policy in ALL {
        policy.template()?;
    }
    Ok(())
}

pub fn find(name: &str) -> Option<&'static RoutePolicy> {
    ALL.iter().find(|policy| policy.name == name)
}

pub fn cluster_admin_role() -> Role {
    Role::new(CLUSTER_ADMIN_ROLE_ID, "Cluster Admin")
        .with_description("Read and write access to every resource")
        .with_policy(Policy::allow("**", "**"))
}
