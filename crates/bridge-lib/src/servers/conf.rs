//! Effective server descriptor for one exposed port

use crate::labels::{server_label_key, ServerLabelField};
use crate::models::ServerConf;
use crate::ports::PORT_PROTOCOL_DELIMITER;
use std::collections::BTreeMap;

/// Caller-supplied server overrides keyed by "port/protocol"
pub type ServerConfMap = BTreeMap<String, ServerConf>;

/// `Server-<port>-<protocol>`
pub fn default_ref(token: &str) -> String {
    format!("Server-{}", token.replace(PORT_PROTOCOL_DELIMITER, "-"))
}

/// Resolve the server descriptor for `token`.
///
/// An override for the token is returned as given. Otherwise each of
/// ref/protocol/path is read from the token-keyed label, falling back to
/// the label keyed by the bare port number. A missing ref is synthesized.
pub fn resolve_server_conf(
    token: &str,
    overrides: &ServerConfMap,
    labels: &BTreeMap<String, String>,
) -> ServerConf {
    if let Some(conf) = overrides.get(token) {
        return conf.clone();
    }

    let bare_port = token
        .split_once(PORT_PROTOCOL_DELIMITER)
        .map(|(port, _)| port)
        .unwrap_or(token);

    let lookup = |field: ServerLabelField| {
        labels
            .get(&server_label_key(token, field))
            .or_else(|| labels.get(&server_label_key(bare_port, field)))
            .cloned()
    };

    ServerConf {
        ref_name: Some(lookup(ServerLabelField::Ref).unwrap_or_else(|| default_ref(token))),
        port: token.to_string(),
        protocol: lookup(ServerLabelField::Protocol),
        path: lookup(ServerLabelField::Path),
    }
}

/// Key server confs by port, appending "/tcp" to ports without a protocol
pub fn normalize_server_confs<I>(confs: I) -> ServerConfMap
where
    I: IntoIterator<Item = ServerConf>,
{
    confs
        .into_iter()
        .map(|mut conf| {
            if !conf.port.contains(PORT_PROTOCOL_DELIMITER) {
                conf.port = format!("{}/tcp", conf.port);
            }
            (conf.port.clone(), conf)
        })
        .collect()
}
