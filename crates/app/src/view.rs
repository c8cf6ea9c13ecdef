//! Minimal HTML status page.

use std::collections::HashMap;

use mast_core::StatusResult;
use tera::{Context, Tera, Value};

const STATUS_PAGE: &str = include_str!("../templates/statuspage.html");

/// Map a deploy status onto a bootstrap alert class.
fn status_bootstrap(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let class = match value.as_str() {
        Some("SUCCESS") => "success",
        Some("RUNNING") => "info",
        Some("FAILED") => "danger",
        _ => "warning",
    };
    Ok(Value::String(class.to_string()))
}

/// The status page template, compiled once. `.html` names get tera's autoescaping.
pub struct StatusPage {
    tera: Tera,
}

impl StatusPage {
    pub fn new() -> tera::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("statuspage.html", STATUS_PAGE)?;
        tera.register_filter("status_bootstrap", status_bootstrap);
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        namespace: &str,
        application: &str,
        deployment_id: &str,
        status: &StatusResult,
    ) -> tera::Result<String> {
        let mut ctx = Context::new();
        ctx.insert("namespace", namespace);
        ctx.insert("application", application);
        ctx.insert("deployment_id", deployment_id);
        ctx.insert("status_object", status);
        self.tera.render("statuspage.html", &ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mast_core::DeployStatus;

    fn page(status: DeployStatus) -> String {
        let s = StatusResult { status, info: "x".into(), logs: vec![] };
        StatusPage::new().unwrap().render("ns", "app", "id", &s).unwrap()
    }

    #[test]
    fn status_maps_to_bootstrap_class() {
        assert!(page(DeployStatus::Unknown).contains("alert-warning"));
        assert!(page(DeployStatus::Success).contains("alert-success"));
        assert!(page(DeployStatus::Running).contains("alert-info"));
        assert!(page(DeployStatus::Failed).contains("alert-danger"));
    }

    #[test]
    fn unrecognised_status_falls_back_to_warning() {
        let out = status_bootstrap(&Value::String("PENDING".into()), &HashMap::new()).unwrap();
        assert_eq!(out, "warning");
    }

    #[test]
    fn page_escapes_user_input() {
        let s = StatusResult { status: DeployStatus::Failed, info: "x".into(), logs: vec!["<b>boom</b>".into()] };
        let html = StatusPage::new().unwrap().render("ns", "<script>", "id", &s).unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&lt;b&gt;boom&lt;&#x2F;b&gt;"));
        assert!(html.contains("alert-danger"));
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn stylesheet_comes_from_cdnjs() {
        assert!(page(DeployStatus::Success).contains("https://cdnjs.cloudflare.com/"));
    }
}
