#![allow(dead_code)]

use assert_cmd::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

pub const DUMP: &str = r#"SecRuleEngine On
# In file: /etc/httpd/conf/httpd.conf
# 3:
DefineStr site_host www.example.org
<VirtualHost *:443>
# In file: macro 'waf' (defined on line 1 of "/etc/httpd/conf/macros.conf") used on line 5 of "/etc/httpd/conf/httpd.conf"
# 1:
<Location /admin>
SecRule ARGS "@rx www.example.org" "id:1001,phase:2,tag:'attack-sqli',msg:'x'"
</Location>
# 2:
<If "%{REMOTE_ADDR} == '10.0.0.1'">
SecRuleRemoveById 1001 2000-2005
# 3:
SecRuleRemoveByTag attack-.*
</If>
</VirtualHost>
"#;

const HTTPD: &str = "ServerName x

DefineStr site_host \"www.example.org\"

Use waf ${site_host}
";

const MACROS: &str = "<Macro waf $host>
  SecRule ARGS \"@rx $host\" \"id:1001,phase:2,tag:'attack-sqli',msg:'x'\"
  SecRuleRemoveById 1001 2000-2005
  SecRuleRemoveByTag attack-.*
</Macro>
";

/// Temp directory with `dump.txt`, the original tree under `tree/` and an
/// empty `home/`.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let conf = dir.path().join("tree/conf");
        fs::create_dir_all(&conf)?;
        fs::write(conf.join("httpd.conf"), HTTPD)?;
        fs::write(conf.join("macros.conf"), MACROS)?;
        fs::write(dir.path().join("dump.txt"), DUMP)?;
        fs::create_dir_all(dir.path().join("home"))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn dump(&self) -> PathBuf {
        self.path().join("dump.txt")
    }

    pub fn tree(&self) -> PathBuf {
        self.path().join("tree")
    }

    pub fn store(&self) -> PathBuf {
        self.path().join("store")
    }

    /// The binary with an isolated HOME and colors off.
    pub fn cmd(&self) -> Result<Command, Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("conftrace")?;
        cmd.env("HOME", self.path().join("home"))
            .env("APPDATA", self.path().join("home"))
            .env("NO_COLOR", "1")
            .env_remove("CONFIG_ROOT")
            .current_dir(self.path());
        Ok(cmd)
    }

    /// Parses the fixture dump as `name`.
    pub fn parse(&self, name: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.cmd()?
            .arg("parse")
            .arg(self.dump())
            .args(["--name", name])
            .arg("--config-root")
            .arg(self.tree())
            .arg("--store")
            .arg(self.store())
            .arg("--quiet")
            .assert()
            .success();
        Ok(())
    }
}
