//! Endpoint resolution: logical secret path to backend route.
//!
//! Resolution is a pure function of the path, the per-call options and the
//! driver's engine defaults.

use crate::config::{EngineConfig, KvVersion};
use crate::driver::KvOptions;

/// Route for seal status inspection.
pub const SEAL_STATUS_ROUTE: &str = "/v1/sys/seal-status";

/// Route for submitting unseal key shares.
pub const UNSEAL_ROUTE: &str = "/v1/sys/unseal";

/// Backend operation a route is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Delete,
    List,
    SealStatus,
    Unseal,
    EnableEngine,
}

/// Mount and engine version in effect for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub mount: String,
    pub version: KvVersion,
}

impl Target {
    pub fn new(options: &KvOptions, engine: &EngineConfig) -> Self {
        let mount = options.mount.as_deref().unwrap_or(&engine.mount);
        Self {
            mount: mount.trim_matches('/').to_owned(),
            version: options.version.unwrap_or(engine.version),
        }
    }
}

/// Resolve the backend route for `operation` on `path`.
///
/// KV v2 routes reads, writes and deletes through `data/` and listings
/// through `metadata/`; KV v1 uses the bare mount for all four. System
/// operations ignore the engine settings; for [`Operation::EnableEngine`]
/// `path` is the literal mount path.
pub fn resolve(path: &str, options: &KvOptions, engine: &EngineConfig, operation: Operation) -> String {
    let path = encode_path(path.trim_matches('/'));

    match operation {
        Operation::SealStatus => SEAL_STATUS_ROUTE.to_owned(),
        Operation::Unseal => UNSEAL_ROUTE.to_owned(),
        Operation::EnableEngine => format!("/v1/sys/mounts/{path}"),
        Operation::Read | Operation::Write | Operation::Delete | Operation::List => {
            let target = Target::new(options, engine);
            let mount = encode_path(&target.mount);
            match (operation, target.version) {
                (Operation::List, KvVersion::V2) => format!("/v1/{mount}/metadata/{path}"),
                (_, KvVersion::V2) => format!("/v1/{mount}/data/{path}"),
                (_, KvVersion::V1) => format!("/v1/{mount}/{path}"),
            }
        }
    }
}

/// Percent-encode a single URL path component.
fn percent_encode_component(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        let safe = b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~');
        if safe {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Percent-encode each segment of a slash-delimited path.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(percent_encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(mount: &str, version: KvVersion) -> EngineConfig {
        EngineConfig {
            mount: mount.into(),
            version,
        }
    }

    #[test]
    fn kv_v2_uses_data_route() {
        let cfg = engine("secret", KvVersion::V2);
        for op in [Operation::Read, Operation::Write, Operation::Delete] {
            assert_eq!(
                resolve("apps/api", &KvOptions::default(), &cfg, op),
                "/v1/secret/data/apps/api"
            );
        }
    }

    #[test]
    fn kv_v2_lists_through_metadata() {
        let cfg = engine("secret", KvVersion::V2);
        assert_eq!(
            resolve("apps", &KvOptions::default(), &cfg, Operation::List),
            "/v1/secret/metadata/apps"
        );
    }

    #[test]
    fn kv_v1_uses_bare_mount() {
        let cfg = engine("kv", KvVersion::V1);
        for op in [
            Operation::Read,
            Operation::Write,
            Operation::Delete,
            Operation::List,
        ] {
            assert_eq!(
                resolve("apps/api", &KvOptions::default(), &cfg, op),
                "/v1/kv/apps/api"
            );
        }
    }

    #[test]
    fn slashes_are_trimmed_from_path_and_mount() {
        let cfg = engine("/secret/", KvVersion::V2);
        assert_eq!(
            resolve("/apps/api/", &KvOptions::default(), &cfg, Operation::Read),
            "/v1/secret/data/apps/api"
        );
        let opts = KvOptions::default().mount("//team-kv/").version(KvVersion::V1);
        assert_eq!(
            resolve("//apps//", &opts, &cfg, Operation::Read),
            "/v1/team-kv/apps"
        );
    }

    #[test]
    fn options_override_engine_defaults() {
        let cfg = engine("secret", KvVersion::V1);
        let opts = KvOptions::default().mount("other").version(KvVersion::V2);
        assert_eq!(
            resolve("x", &opts, &cfg, Operation::Read),
            "/v1/other/data/x"
        );
        assert_eq!(
            resolve("x", &opts, &cfg, Operation::List),
            "/v1/other/metadata/x"
        );
    }

    #[test]
    fn system_routes_ignore_kv_version() {
        let opts = KvOptions::default().mount("kv").version(KvVersion::V2);
        let cfg = engine("secret", KvVersion::V2);
        assert_eq!(
            resolve("", &opts, &cfg, Operation::SealStatus),
            "/v1/sys/seal-status"
        );
        assert_eq!(resolve("", &opts, &cfg, Operation::Unseal), "/v1/sys/unseal");
        assert_eq!(
            resolve("/team/kv/", &opts, &cfg, Operation::EnableEngine),
            "/v1/sys/mounts/team/kv"
        );
    }

    #[test]
    fn empty_list_path_targets_mount_root() {
        let cfg = engine("secret", KvVersion::V2);
        assert_eq!(
            resolve("/", &KvOptions::default(), &cfg, Operation::List),
            "/v1/secret/metadata/"
        );
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(percent_encode_component("my app"), "my%20app");
        assert_eq!(percent_encode_component("A_B-1.2~x"), "A_B-1.2~x");
        let cfg = engine("secret", KvVersion::V2);
        assert_eq!(
            resolve("apps/my app", &KvOptions::default(), &cfg, Operation::Read),
            "/v1/secret/data/apps/my%20app"
        );
    }
}
