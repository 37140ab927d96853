//! Credential parsing
//!
//! Turns an opaque kubeconfig blob into the parameters needed to build a client.

use kube::config::Kubeconfig;
use kubefleet_common::{Error, Result};
use std::fmt;

/// Everything needed to construct a client for one cluster
#[derive(Clone)]
pub struct ConnectionParams {
    pub kubeconfig: Kubeconfig,
    /// Context selected from the kubeconfig
    pub context: String,
    /// API server URL of the selected context's cluster
    pub api_server: String,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("context", &self.context)
            .field("api_server", &self.api_server)
            .finish_non_exhaustive()
    }
}

/// Parse a kubeconfig document using its current context
pub fn parse(blob: &[u8]) -> Result<ConnectionParams> {
    let text = std::str::from_utf8(blob)
        .map_err(|_| Error::InvalidConfig("kubeconfig is not valid UTF-8".to_string()))?;

    if text.trim().is_empty() {
        return Err(Error::InvalidConfig("kubeconfig is empty".to_string()));
    }

    // The YAML error text can quote document content, so it is not forwarded
    let kubeconfig = Kubeconfig::from_yaml(text)
        .map_err(|_| Error::InvalidConfig("failed to parse kubeconfig YAML".to_string()))?;

    let context = kubeconfig
        .current_context
        .clone()
        .filter(|c| !c.is_empty())
        .or_else(|| match kubeconfig.contexts.as_slice() {
            [only] => Some(only.name.clone()),
            _ => None,
        })
        .ok_or_else(|| Error::InvalidConfig("no current-context in kubeconfig".to_string()))?;

    let api_server = extract_api_server(&kubeconfig, &context)?;

    Ok(ConnectionParams {
        kubeconfig,
        context,
        api_server,
    })
}

fn extract_api_server(kubeconfig: &Kubeconfig, context_name: &str) -> Result<String> {
    let context = kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == context_name)
        .ok_or_else(|| Error::InvalidConfig(format!("context '{}' not found", context_name)))?;

    let cluster_name = context
        .context
        .as_ref()
        .map(|c| c.cluster.as_str())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            Error::InvalidConfig(format!("context '{}' has no cluster reference", context_name))
        })?;

    let cluster = kubeconfig
        .clusters
        .iter()
        .find(|c| c.name == cluster_name)
        .ok_or_else(|| Error::InvalidConfig(format!("cluster '{}' not found", cluster_name)))?;

    cluster
        .cluster
        .as_ref()
        .and_then(|c| c.server.clone())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidConfig(format!("cluster '{}' has no server URL", cluster_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: admin@edge
clusters:
- name: edge
  cluster:
    server: https://edge.example.com:6443
    insecure-skip-tls-verify: true
contexts:
- name: admin@edge
  context:
    cluster: edge
    user: admin
users:
- name: admin
  user:
    token: very-secret-token
"#;

    #[test]
    fn test_parse_resolves_current_context() {
        let params = parse(KUBECONFIG.as_bytes()).unwrap();
        assert_eq!(params.context, "admin@edge");
        assert_eq!(params.api_server, "https://edge.example.com:6443");
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let params = parse(KUBECONFIG.as_bytes()).unwrap();
        let debug = format!("{:?}", params);
        assert!(!debug.contains("very-secret-token"));
        assert!(debug.contains("edge.example.com"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(parse(b"\xff\xfe"), Err(Error::InvalidConfig(_))));
        assert!(matches!(parse(b"   "), Err(Error::InvalidConfig(_))));
        assert!(matches!(parse(b"clusters: [unterminated"), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_missing_server() {
        let doc = KUBECONFIG.replace("    server: https://edge.example.com:6443\n", "");
        match parse(doc.as_bytes()) {
            Err(Error::InvalidConfig(msg)) => assert!(msg.contains("no server URL")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_dangling_context() {
        let doc = KUBECONFIG.replace("current-context: admin@edge", "current-context: nowhere");
        match parse(doc.as_bytes()) {
            Err(Error::InvalidConfig(msg)) => assert!(msg.contains("nowhere")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
