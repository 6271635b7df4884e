//! Synthetic configurations for the benchmarks.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

pub struct Synthetic {
    pub dump: String,
    pub httpd: String,
    pub macros: String,
}

const MACROS: &str = "<Macro waf $host $id>
  SecRule REQUEST_HEADERS:Host \"@streq $host\" \"id:$id,phase:request,tag:'bench/host',setvar:tx.host_seen=1,msg:'host %{MATCHED_VAR}'\"
  SecRuleRemoveById $id
  SecRuleRemoveByTag bench/.*
</Macro>
";

/// A server whose `httpd.conf` invokes the `waf` macro `expansions` times,
/// plus the dump Apache would print for it.
pub fn synthetic(expansions: usize) -> Synthetic {
    let mut httpd = String::from("DefineStr site \"www.example.org\"\n");
    let mut dump = String::from(
        "# In file: /etc/httpd/conf/httpd.conf\n# 1:\nDefineStr site www.example.org\n",
    );
    for i in 0..expansions {
        let id = 100_000 + i;
        let line = i + 2;
        let _ = writeln!(httpd, "Use waf ${{site}} {id}");
        let _ = write!(
            dump,
            "# In file: macro 'waf' (defined on line 1 of \"/etc/httpd/conf/macros.conf\") used on line {line} of \"/etc/httpd/conf/httpd.conf\"\n\
             # 1:\n\
             SecRule REQUEST_HEADERS:Host \"@streq www.example.org\" \"id:{id},phase:request,tag:'bench/host',setvar:tx.host_seen=1,msg:'host %{{MATCHED_VAR}}'\"\n\
             # 2:\n\
             SecRuleRemoveById {id}\n\
             # 3:\n\
             SecRuleRemoveByTag bench/.*\n"
        );
    }
    Synthetic {
        dump,
        httpd,
        macros: MACROS.to_string(),
    }
}

/// Writes `conf/httpd.conf`, `conf/macros.conf` and `dump.txt` under `root`.
pub fn write_tree(root: &Path, cfg: &Synthetic) -> io::Result<()> {
    let conf = root.join("conf");
    fs::create_dir_all(&conf)?;
    fs::write(conf.join("httpd.conf"), &cfg.httpd)?;
    fs::write(conf.join("macros.conf"), &cfg.macros)?;
    fs::write(root.join("dump.txt"), &cfg.dump)
}
