//! Resource graph fetcher: projects, workbooks, views and datasources.
//!
//! Each list call decodes the platform's nested envelope
//! (`{kind: {kind_singular: [...]}}`) into the one normalized
//! [`ResourceRecord`] shape. Parent references that the platform omits
//! default to `None` rather than failing; a missing outer envelope key is
//! a malformed response.

use futures::try_join;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::contract::UpstreamClient;
use crate::error::UpstreamError;
use crate::session::Session;

/// Normalized projection of one upstream entity, uniform across kinds.
///
/// `parent_id` points at the owning project (projects, datasources), the
/// owning workbook (views) or the containing project (workbooks).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// Aggregate snapshot of the site's resource graph at fetch time.
#[derive(Debug, Clone, Serialize)]
pub struct SiteCatalog {
    pub projects: Vec<ResourceRecord>,
    pub workbooks: Vec<ResourceRecord>,
    pub views: Vec<ResourceRecord>,
    pub datasources: Vec<ResourceRecord>,
}

// Envelope shapes, decoded once at the client boundary. The platform
// omits the inner singular key entirely when a site has no entities of a
// kind, hence the serde defaults.

#[derive(Debug, Deserialize)]
struct ProjectsEnvelope {
    projects: ProjectGroup,
}

#[derive(Debug, Deserialize)]
struct ProjectGroup {
    #[serde(default)]
    project: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
struct ProjectEntry {
    id: String,
    name: String,
    #[serde(rename = "parentProjectId")]
    parent_project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkbooksEnvelope {
    workbooks: WorkbookGroup,
}

#[derive(Debug, Deserialize)]
struct WorkbookGroup {
    #[serde(default)]
    workbook: Vec<WorkbookEntry>,
}

#[derive(Debug, Deserialize)]
struct WorkbookEntry {
    id: String,
    name: String,
    #[serde(default)]
    project: Option<OwnerRef>,
}

#[derive(Debug, Deserialize)]
struct ViewsEnvelope {
    views: ViewGroup,
}

#[derive(Debug, Deserialize)]
struct ViewGroup {
    #[serde(default)]
    view: Vec<ViewEntry>,
}

#[derive(Debug, Deserialize)]
struct ViewEntry {
    id: String,
    name: String,
    #[serde(default)]
    workbook: Option<OwnerRef>,
}

#[derive(Debug, Deserialize)]
struct DatasourcesEnvelope {
    datasources: DatasourceGroup,
}

#[derive(Debug, Deserialize)]
struct DatasourceGroup {
    #[serde(default)]
    datasource: Vec<DatasourceEntry>,
}

#[derive(Debug, Deserialize)]
struct DatasourceEntry {
    id: String,
    name: String,
    #[serde(default)]
    project: Option<OwnerRef>,
}

/// Owning-entity reference nested inside an entry; the id itself may be
/// absent for entities outside any container.
#[derive(Debug, Deserialize)]
struct OwnerRef {
    #[serde(default)]
    id: Option<String>,
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, context: &str) -> Result<T, UpstreamError> {
    serde_json::from_value(value).map_err(|e| UpstreamError::malformed(200, &format!("{context}: {e}")))
}

fn site_path(session: &Session, suffix: &str) -> String {
    format!("sites/{}/{}", session.site_id, suffix)
}

pub async fn list_projects(
    upstream: &dyn UpstreamClient,
    session: &Session,
) -> Result<Vec<ResourceRecord>, UpstreamError> {
    let value = upstream
        .get_json(&site_path(session, "projects"), &session.upstream_token)
        .await?;
    let envelope: ProjectsEnvelope = decode(value, "projects")?;
    debug!(count = envelope.projects.project.len(), "listed projects");
    Ok(envelope
        .projects
        .project
        .into_iter()
        .map(|p| ResourceRecord {
            id: p.id,
            name: p.name,
            parent_id: p.parent_project_id,
        })
        .collect())
}

pub async fn list_workbooks(
    upstream: &dyn UpstreamClient,
    session: &Session,
) -> Result<Vec<ResourceRecord>, UpstreamError> {
    let value = upstream
        .get_json(&site_path(session, "workbooks"), &session.upstream_token)
        .await?;
    let envelope: WorkbooksEnvelope = decode(value, "workbooks")?;
    debug!(count = envelope.workbooks.workbook.len(), "listed workbooks");
    Ok(envelope
        .workbooks
        .workbook
        .into_iter()
        .map(|w| ResourceRecord {
            id: w.id,
            name: w.name,
            parent_id: w.project.and_then(|p| p.id),
        })
        .collect())
}

pub async fn list_views(
    upstream: &dyn UpstreamClient,
    session: &Session,
) -> Result<Vec<ResourceRecord>, UpstreamError> {
    let value = upstream
        .get_json(&site_path(session, "views"), &session.upstream_token)
        .await?;
    let envelope: ViewsEnvelope = decode(value, "views")?;
    debug!(count = envelope.views.view.len(), "listed views");
    Ok(envelope
        .views
        .view
        .into_iter()
        .map(|v| ResourceRecord {
            id: v.id,
            name: v.name,
            parent_id: v.workbook.and_then(|w| w.id),
        })
        .collect())
}

pub async fn list_datasources(
    upstream: &dyn UpstreamClient,
    session: &Session,
) -> Result<Vec<ResourceRecord>, UpstreamError> {
    let value = upstream
        .get_json(&site_path(session, "datasources"), &session.upstream_token)
        .await?;
    let envelope: DatasourcesEnvelope = decode(value, "datasources")?;
    debug!(
        count = envelope.datasources.datasource.len(),
        "listed datasources"
    );
    Ok(envelope
        .datasources
        .datasource
        .into_iter()
        .map(|d| ResourceRecord {
            id: d.id,
            name: d.name,
            parent_id: d.project.and_then(|p| p.id),
        })
        .collect())
}

/// Fetches all four resource kinds concurrently, all-or-nothing: any
/// failing list call fails the whole aggregate with no partial result.
pub async fn fetch_all(
    upstream: &dyn UpstreamClient,
    session: &Session,
) -> Result<SiteCatalog, UpstreamError> {
    let (projects, workbooks, views, datasources) = try_join!(
        list_projects(upstream, session),
        list_workbooks(upstream, session),
        list_views(upstream, session),
        list_datasources(upstream, session),
    )?;
    Ok(SiteCatalog {
        projects,
        workbooks,
        views,
        datasources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn project_envelope_flattens_and_defaults_parent() {
        let envelope: ProjectsEnvelope = decode(
            json!({
                "projects": {
                    "project": [
                        { "id": "p1", "name": "Top", "description": "ignored" },
                        { "id": "p2", "name": "Nested", "parentProjectId": "p1" }
                    ]
                }
            }),
            "projects",
        )
        .expect("envelope should decode");
        assert_eq!(envelope.projects.project.len(), 2);
        assert_eq!(envelope.projects.project[0].parent_project_id, None);
        assert_eq!(
            envelope.projects.project[1].parent_project_id.as_deref(),
            Some("p1")
        );
    }

    #[test]
    fn empty_site_omits_the_inner_key() {
        let envelope: WorkbooksEnvelope =
            decode(json!({ "workbooks": {} }), "workbooks").expect("empty list is not an error");
        assert!(envelope.workbooks.workbook.is_empty());
    }

    #[test]
    fn missing_outer_key_is_a_malformed_envelope() {
        let err = decode::<ViewsEnvelope>(json!({ "unexpected": {} }), "views")
            .expect_err("missing outer key must fail");
        assert_eq!(err.status, 200);
        assert!(err.detail.contains("views"));
    }

    #[test]
    fn workbook_owner_without_id_defaults_to_none() {
        let envelope: WorkbooksEnvelope = decode(
            json!({
                "workbooks": {
                    "workbook": [ { "id": "w1", "name": "Sales", "project": {} } ]
                }
            }),
            "workbooks",
        )
        .expect("envelope should decode");
        assert!(envelope.workbooks.workbook[0]
            .project
            .as_ref()
            .and_then(|p| p.id.clone())
            .is_none());
    }
}
