//! Connection resolver: classifies a workbook's data connections as
//! published or embedded datasources.
//!
//! The published-datasource index is recomputed from the site's datasource
//! list at the start of every resolution, so a publish or unpublish on the
//! upstream site is visible to the next call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog;
use crate::contract::UpstreamClient;
use crate::error::UpstreamError;
use crate::session::Session;

/// Datasource reference embedded in a connection; absent for
/// non-datasource connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasourceRef {
    pub id: String,
    pub name: String,
}

/// One data connection of a workbook, typed where the pipeline needs it
/// and with the remaining upstream fields preserved in `extra` for the raw
/// passthrough operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub connection_type: Option<String>,
    #[serde(rename = "serverAddress", default)]
    pub server_address: Option<String>,
    #[serde(rename = "serverPort", default)]
    pub server_port: Option<String>,
    #[serde(rename = "userName", default)]
    pub username: Option<String>,
    #[serde(default)]
    pub datasource: Option<DatasourceRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Classification result for one referenced datasource.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkbookDatasource {
    pub datasource_id: String,
    pub datasource_name: String,
    pub published: bool,
}

#[derive(Debug, Deserialize)]
struct ConnectionsEnvelope {
    connections: ConnectionGroup,
}

#[derive(Debug, Deserialize)]
struct ConnectionGroup {
    #[serde(default)]
    connection: Vec<ConnectionRecord>,
}

/// Un-normalized passthrough of the workbook's connection list, order
/// preserved.
pub async fn raw_connections(
    upstream: &dyn UpstreamClient,
    session: &Session,
    workbook_id: &str,
) -> Result<Vec<ConnectionRecord>, UpstreamError> {
    let path = format!(
        "sites/{}/workbooks/{}/connections",
        session.site_id, workbook_id
    );
    let value = upstream.get_json(&path, &session.upstream_token).await?;
    let envelope: ConnectionsEnvelope = serde_json::from_value(value)
        .map_err(|e| UpstreamError::malformed(200, &format!("connections: {e}")))?;
    debug!(
        workbook_id,
        count = envelope.connections.connection.len(),
        "listed workbook connections"
    );
    Ok(envelope.connections.connection)
}

/// The site's published datasources, keyed by id.
pub async fn published_index(
    upstream: &dyn UpstreamClient,
    session: &Session,
) -> Result<HashMap<String, String>, UpstreamError> {
    Ok(catalog::list_datasources(upstream, session)
        .await?
        .into_iter()
        .map(|record| (record.id, record.name))
        .collect())
}

/// Reports every connection with a non-null datasource reference,
/// classified against a freshly computed published index. Input order is
/// preserved; each connection is classified independently.
pub async fn resolve_workbook_datasources(
    upstream: &dyn UpstreamClient,
    session: &Session,
    workbook_id: &str,
) -> Result<Vec<WorkbookDatasource>, UpstreamError> {
    let published = published_index(upstream, session).await?;
    let connections = raw_connections(upstream, session, workbook_id).await?;
    Ok(classify(connections, &published))
}

fn classify(
    connections: Vec<ConnectionRecord>,
    published: &HashMap<String, String>,
) -> Vec<WorkbookDatasource> {
    connections
        .into_iter()
        .filter_map(|connection| connection.datasource)
        .map(|reference| WorkbookDatasource {
            published: published.contains_key(&reference.id),
            datasource_id: reference.id,
            datasource_name: reference.name,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connection(id: &str, datasource: Option<(&str, &str)>) -> ConnectionRecord {
        serde_json::from_value(match datasource {
            Some((ds_id, ds_name)) => json!({
                "id": id,
                "type": "postgres",
                "datasource": { "id": ds_id, "name": ds_name }
            }),
            None => json!({ "id": id, "type": "sqlproxy" }),
        })
        .expect("connection fixture should decode")
    }

    #[test]
    fn classification_is_total_and_order_preserving() {
        let published: HashMap<String, String> =
            [("ds1".to_string(), "Sales".to_string())].into_iter().collect();
        let classified = classify(
            vec![
                connection("c1", Some(("ds1", "Sales"))),
                connection("c2", None),
                connection("c3", Some(("ds9", "Scratch"))),
            ],
            &published,
        );
        // The null-ref connection contributes no entry; the rest keep order.
        assert_eq!(classified.len(), 2);
        assert_eq!(classified[0].datasource_id, "ds1");
        assert!(classified[0].published);
        assert_eq!(classified[1].datasource_id, "ds9");
        assert!(!classified[1].published, "ref absent from index is embedded");
    }

    #[test]
    fn extra_upstream_fields_survive_the_raw_record() {
        let record: ConnectionRecord = serde_json::from_value(json!({
            "id": "c1",
            "type": "postgres",
            "serverAddress": "db.internal",
            "embedPassword": true
        }))
        .expect("record should decode");
        assert_eq!(record.server_address.as_deref(), Some("db.internal"));
        assert_eq!(record.extra.get("embedPassword"), Some(&json!(true)));
    }
}
