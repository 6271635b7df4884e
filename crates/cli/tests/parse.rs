mod common;

use assert_cmd::prelude::*;
use common::Fixture;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::fs;

#[test]
fn parse_prints_summary_and_logs() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new()?;
    fx.cmd()?
        .arg("parse")
        .arg(fx.dump())
        .args(["--name", "site"])
        .arg("--config-root")
        .arg(fx.tree())
        .arg("--store")
        .arg(fx.store())
        .assert()
        .success()
        .stdout(
            contains("[site] 5 directives")
                .and(contains("secrule=1"))
                .and(contains("macro definitions")),
        )
        .stderr(contains("Parse started").and(contains("Configuration parsed")));

    assert!(fx.store().join("site.graph.json").is_file());
    assert!(fx.store().join("site.report.json").is_file());
    assert!(fx.store().join("symbols.sqlite3").is_file());
    Ok(())
}

#[test]
fn quiet_flag_hides_logs() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new()?;
    fx.cmd()?
        .arg("parse")
        .arg(fx.dump())
        .arg("--config-root")
        .arg(fx.tree())
        .arg("--store")
        .arg(fx.store())
        .arg("--quiet")
        .assert()
        .success()
        .stdout(contains("[dump] 5 directives"))
        .stderr(contains("Parse started").not());
    Ok(())
}

#[test]
fn json_report_matches_persisted_report() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new()?;
    let output = fx
        .cmd()?
        .arg("parse")
        .arg(fx.dump())
        .args(["--name", "json", "--format", "json", "--quiet"])
        .arg("--config-root")
        .arg(fx.tree())
        .arg("--store")
        .arg(fx.store())
        .output()?;
    assert!(output.status.success());
    let printed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(printed["configuration"], "json");
    assert_eq!(printed["directives"], 5);
    assert_eq!(printed["by_kind"]["removebyid"], 1);

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(fx.store().join("json.report.json"))?)?;
    assert_eq!(saved, printed);
    Ok(())
}

#[test]
fn store_dir_comes_from_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new()?;
    let cfg_dir = fx.path().join("home/.config/conftrace");
    fs::create_dir_all(&cfg_dir)?;
    let store = fx.path().join("configured-store");
    fs::write(
        cfg_dir.join("config.toml"),
        format!("[store]\ndir = {:?}\n", store.display().to_string()),
    )?;
    fx.cmd()?
        .arg("parse")
        .arg(fx.dump())
        .arg("--config-root")
        .arg(fx.tree())
        .arg("--quiet")
        .assert()
        .success();
    assert!(store.join("dump.graph.json").is_file());
    Ok(())
}

#[test]
fn cypher_script_is_written() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new()?;
    let script = fx.path().join("site.cypher");
    fx.cmd()?
        .arg("parse")
        .arg(fx.dump())
        .arg("--config-root")
        .arg(fx.tree())
        .arg("--store")
        .arg(fx.store())
        .arg("--cypher")
        .arg(&script)
        .arg("--quiet")
        .assert()
        .success()
        .stdout(contains("cypher:"));
    let text = fs::read_to_string(&script)?;
    assert!(text.contains(":param batch =>"));
    Ok(())
}

#[test]
fn missing_dump_fails() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new()?;
    fx.cmd()?
        .arg("parse")
        .arg(fx.path().join("absent.txt"))
        .arg("--store")
        .arg(fx.store())
        .assert()
        .failure()
        .stderr(contains("failed to read dump"));
    Ok(())
}

#[test]
fn malformed_annotation_fails_with_line() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new()?;
    fs::write(
        fx.dump(),
        common::DUMP.replace(
            "# In file: /etc/httpd/conf/httpd.conf",
            "# In file: not an annotation",
        ),
    )?;
    fx.cmd()?
        .arg("parse")
        .arg(fx.dump())
        .arg("--store")
        .arg(fx.store())
        .arg("--quiet")
        .assert()
        .failure()
        .stderr(contains("dump line 2"));
    assert!(!fx.store().join("dump.graph.json").exists());
    Ok(())
}

#[test]
fn invalid_name_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new()?;
    fx.cmd()?
        .arg("parse")
        .arg(fx.dump())
        .args(["--name", "../escape"])
        .assert()
        .failure()
        .stderr(contains("names may only contain"));
    Ok(())
}
