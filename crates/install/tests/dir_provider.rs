#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use helmdock_core::ChartRef;
use helmdock_install::{ChartDetailsProvider, ChartValuesProvider, DirChartProvider, InstallChartTabStore, LoaderConfig, ValuesOutcome};

fn write(root: &std::path::Path, rel: &str, body: &str) {
    let p = root.join(rel);
    std::fs::create_dir_all(p.parent().unwrap()).unwrap();
    std::fs::write(p, body).unwrap();
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "bitnami/nginx/1.9.0/values.yaml", "replicaCount: 1\n");
    write(dir.path(), "bitnami/nginx/1.10.0/values.yaml", "replicaCount: 2\n");
    write(dir.path(), "bitnami/nginx/1.10.0/Chart.yaml", "name: nginx\nappVersion: \"1.25\"\ndescription: web server\n");
    write(dir.path(), "bitnami/nginx/1.10.0/README.md", "# nginx\n");
    // published but values not indexed yet
    std::fs::create_dir_all(dir.path().join("bitnami/nginx/2.0.0-rc.1")).unwrap();
    dir
}

#[tokio::test]
async fn details_list_versions_newest_first() {
    let dir = fixture();
    let p = DirChartProvider::new(dir.path());
    let details = p.get_details("bitnami", "nginx", Some("1.10.0")).await.unwrap();
    assert_eq!(details.version_list(), vec!["2.0.0-rc.1", "1.10.0", "1.9.0"]);
    assert_eq!(details.versions[1].app_version.as_deref(), Some("1.25"));
    assert_eq!(details.readme.as_deref(), Some("# nginx\n"));
}

#[tokio::test]
async fn missing_chart_is_an_error() {
    let dir = fixture();
    let p = DirChartProvider::new(dir.path());
    assert!(p.get_details("bitnami", "redis", None).await.is_err());
    assert!(p.get_values("bitnami", "nginx", "0.0.1").await.is_err());
}

#[tokio::test]
async fn unindexed_values_read_as_not_ready() {
    let dir = fixture();
    let p = DirChartProvider::new(dir.path());
    assert_eq!(p.get_values("bitnami", "nginx", "2.0.0-rc.1").await.unwrap(), None);
    assert_eq!(p.get_values("bitnami", "nginx", "1.9.0").await.unwrap().as_deref(), Some("replicaCount: 1\n"));
}

#[tokio::test]
async fn tab_loads_from_directory() {
    let dir = fixture();
    let p = Arc::new(DirChartProvider::new(dir.path()));
    let cfg = LoaderConfig { values_retry_delay: Duration::ZERO, ..LoaderConfig::default() };
    let s = InstallChartTabStore::new(p.clone(), p).with_config(cfg);
    let tab = s.open_tab(&ChartRef { repo: "bitnami".into(), name: "nginx".into(), version: "1.10.0".into() }, None);

    s.load_data(&tab).await.unwrap();
    assert_eq!(s.get_data(&tab).unwrap().values.as_deref(), Some("replicaCount: 2\n"));
    assert_eq!(s.versions().get_data(&tab).unwrap().len(), 3);

    assert_eq!(s.change_version(&tab, "2.0.0-rc.1").await.unwrap(), ValuesOutcome::NotAvailable { attempts: 5 });
    assert!(s.get_data(&tab).unwrap().values.is_none());
}
