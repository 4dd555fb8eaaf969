//! Kubernetes helpers shared by the controller crates

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;

/// Whether a kube error is a 404 Not Found from the API server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Whether a kube error is a 409 Conflict from the API server
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// The owner reference flagged as controller, if any
pub fn controller_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_deref()
        .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)))
}

/// Value of a label, treating an empty value as absent
pub fn label<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Label selector string matching every key/value pair in `labels`
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Merge-patch the status sub-resource of a namespaced resource.
///
/// The patch body is `{ "metadata": { "resourceVersion": .. }, "status": .. }`
/// when a resource version is given, so a stale writer receives 409 Conflict
/// instead of silently overwriting a newer status.
///
/// Returns `kube::Error` so callers can map to their own error type.
pub async fn patch_resource_status<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    resource_version: Option<&str>,
    status: &serde_json::Value,
    field_manager: &str,
) -> std::result::Result<(), kube::Error>
where
    T: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
    <T as kube::Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let mut patch = serde_json::json!({ "status": status });
    if let Some(rv) = resource_version {
        patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
    }
    api.patch_status(name, &PatchParams::apply(field_manager), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(kind: &str, name: &str, controller: Option<bool>) -> OwnerReference {
        OwnerReference {
            api_version: "v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: format!("{name}-uid"),
            controller,
            block_owner_deletion: None,
        }
    }

    #[test]
    fn test_controller_owner_ignores_non_controller_refs() {
        let meta = ObjectMeta {
            owner_references: Some(vec![
                owner("ConfigMap", "cm", None),
                owner("ReplicaSet", "rs", Some(false)),
                owner("Workspace", "ws", Some(true)),
            ]),
            ..Default::default()
        };
        assert_eq!(controller_owner(&meta).unwrap().name, "ws");
        assert!(controller_owner(&ObjectMeta::default()).is_none());
    }

    #[test]
    fn test_label_treats_empty_as_absent() {
        let meta = ObjectMeta {
            labels: Some(BTreeMap::from([
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), String::new()),
            ])),
            ..Default::default()
        };
        assert_eq!(label(&meta, "a"), Some("1"));
        assert_eq!(label(&meta, "b"), None);
        assert_eq!(label(&meta, "c"), None);
    }

    #[test]
    fn test_label_selector_is_sorted_and_joined() {
        let labels = BTreeMap::from([
            ("che.workspace_id".to_string(), "workspaceabc".to_string()),
            ("app".to_string(), "che".to_string()),
        ]);
        assert_eq!(
            label_selector(&labels),
            "app=che,che.workspace_id=workspaceabc"
        );
    }
}
