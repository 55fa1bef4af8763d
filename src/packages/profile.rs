// src/packages/profile.rs

//! Profile (`config.json`) parsing
//!
//! The profile describes the app (bundle name, version), its module and
//! abilities, and the permissions it requests. Parsing yields the
//! registry's [`BundleInfo`] (paths and appId are filled in later by the
//! installer), the permission list and the resource list entry.

use crate::error::{Error, Result};
use crate::permissions::Permission;
use crate::registry::models::{AbilityInfo, AbilityRes, BundleInfo, BundleRes, ModuleInfo};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ProfileDoc {
    app: AppSection,
    #[serde(default)]
    module: ModuleSection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSection {
    bundle_name: Option<String>,
    vendor: Option<String>,
    version: Option<VersionSection>,
    api_version: Option<ApiVersionSection>,
}

#[derive(Debug, Deserialize)]
struct VersionSection {
    code: Option<u32>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiVersionSection {
    #[serde(default)]
    compatible: u32,
    #[serde(default)]
    target: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleSection {
    name: Option<String>,
    #[serde(default)]
    device_type: Vec<String>,
    distro: Option<DistroSection>,
    #[serde(default)]
    abilities: Vec<AbilitySection>,
    #[serde(default)]
    req_permissions: Vec<PermissionSection>,
    label_id: Option<u32>,
    icon_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DistroSection {
    module_name: String,
    #[serde(default)]
    module_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbilitySection {
    name: String,
    label: Option<String>,
    icon: Option<String>,
    #[serde(default)]
    label_id: u32,
    #[serde(default)]
    icon_id: u32,
    #[serde(default)]
    visible: bool,
    src_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionSection {
    name: Option<String>,
    reason: Option<String>,
    used_scene: Option<UsedSceneSection>,
}

#[derive(Debug, Default, Deserialize)]
struct UsedSceneSection {
    #[serde(default)]
    ability: Vec<String>,
    when: Option<String>,
}

/// Everything the installer takes from a profile
#[derive(Debug, Clone)]
pub struct ParsedProfile {
    pub bundle: BundleInfo,
    pub permissions: Vec<Permission>,
    pub resources: BundleRes,
}

/// Parse profile bytes
pub fn parse_profile(bytes: &[u8]) -> Result<ParsedProfile> {
    let doc: ProfileDoc = serde_json::from_slice(bytes)
        .map_err(|e| Error::ParseProfileError(format!("invalid JSON: {}", e)))?;

    let bundle_name = doc
        .app
        .bundle_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::ParseProfileError("app.bundleName is missing".to_string()))?;

    let version = doc
        .app
        .version
        .ok_or_else(|| Error::ParseProfileError("app.version is missing".to_string()))?;
    let version_code = version
        .code
        .ok_or_else(|| Error::ParseProfileError("app.version.code is missing".to_string()))?;

    let api = doc.app.api_version.unwrap_or_default();
    let module = doc.module;

    let module_name = module
        .distro
        .as_ref()
        .map(|d| d.module_name.clone())
        .or(module.name.clone())
        .unwrap_or_default();
    let module_type = module
        .distro
        .as_ref()
        .map(|d| d.module_type.clone())
        .unwrap_or_default();

    let abilities: Vec<AbilityInfo> = module
        .abilities
        .into_iter()
        .map(|a| AbilityInfo {
            name: a.name,
            label: a.label,
            icon: a.icon,
            label_id: a.label_id,
            icon_id: a.icon_id,
            visible: a.visible,
            src_path: a.src_path,
        })
        .collect();

    let permissions = module
        .req_permissions
        .into_iter()
        .map(|p| {
            let name = p
                .name
                .filter(|n| !n.is_empty())
                .ok_or_else(|| Error::ParseProfileError("permission without a name".to_string()))?;
            let scene = p.used_scene.unwrap_or_default();
            Ok(Permission {
                name,
                reason: p.reason,
                abilities: scene.ability,
                when: scene.when,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // bundle-level resources fall back to the first ability
    let first = abilities.first();
    let label_id = module
        .label_id
        .or(first.map(|a| a.label_id))
        .unwrap_or_default();
    let icon_id = module
        .icon_id
        .or(first.map(|a| a.icon_id))
        .unwrap_or_default();

    let resources = BundleRes {
        bundle_name: bundle_name.clone(),
        module_name: module_name.clone(),
        label_id,
        icon_id,
        abilities: abilities
            .iter()
            .map(|a| AbilityRes {
                name: a.name.clone(),
                label_id: a.label_id,
                icon_id: a.icon_id,
            })
            .collect(),
    };

    let mut bundle = BundleInfo::new(bundle_name, version_code);
    bundle.vendor = doc.app.vendor;
    bundle.version_name = version.name;
    bundle.compatible_api = api.compatible;
    bundle.target_api = api.target;
    bundle.label_id = label_id;
    bundle.icon_id = icon_id;
    bundle.modules = vec![ModuleInfo {
        module_name,
        module_type,
        device_types: module.device_type,
        abilities,
    }];

    debug!(
        "Parsed profile of {} version {} ({} permissions)",
        bundle.bundle_name,
        bundle.version_code,
        permissions.len()
    );

    Ok(ParsedProfile {
        bundle,
        permissions,
        resources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{
        "app": {
            "bundleName": "com.example.app",
            "vendor": "example",
            "version": { "code": 3, "name": "1.2.0" },
            "apiVersion": { "compatible": 5, "target": 6 }
        },
        "module": {
            "deviceType": ["liteWearable"],
            "distro": { "moduleName": "entry", "moduleType": "entry" },
            "abilities": [
                { "name": "MainAbility", "label": "$string:app_name", "labelId": 16777216, "iconId": 16777217, "visible": true }
            ],
            "reqPermissions": [
                { "name": "ohos.permission.CAMERA", "reason": "scan", "usedScene": { "ability": ["MainAbility"], "when": "inuse" } }
            ]
        }
    }"#;

    #[test]
    fn test_parse_full_profile() {
        let parsed = parse_profile(PROFILE.as_bytes()).unwrap();
        let bundle = &parsed.bundle;

        assert_eq!(bundle.bundle_name, "com.example.app");
        assert_eq!(bundle.version_code, 3);
        assert_eq!(bundle.version_name, "1.2.0");
        assert_eq!(bundle.compatible_api, 5);
        assert_eq!(bundle.vendor.as_deref(), Some("example"));
        assert_eq!(bundle.label_id, 16777216);
        assert_eq!(bundle.icon_id, 16777217);

        let module = bundle.main_module().unwrap();
        assert_eq!(module.module_name, "entry");
        assert_eq!(module.abilities.len(), 1);
        assert!(module.abilities[0].visible);

        assert_eq!(parsed.permissions.len(), 1);
        assert_eq!(parsed.permissions[0].abilities, vec!["MainAbility".to_string()]);
        assert_eq!(parsed.permissions[0].when.as_deref(), Some("inuse"));

        assert_eq!(parsed.resources.module_name, "entry");
        assert_eq!(parsed.resources.abilities[0].label_id, 16777216);
    }

    #[test]
    fn test_minimal_profile() {
        let parsed =
            parse_profile(br#"{"app":{"bundleName":"com.example.app","version":{"code":1}}}"#).unwrap();
        assert_eq!(parsed.bundle.version_code, 1);
        assert!(parsed.permissions.is_empty());
        assert_eq!(parsed.resources.label_id, 0);
    }

    #[test]
    fn test_missing_fields() {
        for bad in [
            r#"{"app":{"version":{"code":1}}}"#,
            r#"{"app":{"bundleName":"com.example.app"}}"#,
            r#"{"app":{"bundleName":"com.example.app","version":{"name":"1"}}}"#,
            r#"{"app":{"bundleName":"com.example.app","version":{"code":1}},"module":{"reqPermissions":[{"reason":"x"}]}}"#,
            r#"not json"#,
        ] {
            assert!(
                matches!(parse_profile(bad.as_bytes()), Err(Error::ParseProfileError(_))),
                "{} should be rejected",
                bad
            );
        }
    }
}
