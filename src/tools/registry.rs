use std::path::Path;

use serde::{Deserialize, Serialize};

use super::executor::ToolCommand;

/// Every external binary the engine knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Subfinder,
    Assetfinder,
    Amass,
    Chaos,
    Sublist3r,
    Waybackurls,
    Gau,
    Gospider,
    Gf,
    Nuclei,
    Nmap,
    Wappalyzer,
    Feroxbuster,
    Gobuster,
    Katana,
    Hakrawler,
    JwtTool,
}

impl Tool {
    pub const ALL: [Tool; 17] = [
        Tool::Subfinder,
        Tool::Assetfinder,
        Tool::Amass,
        Tool::Chaos,
        Tool::Sublist3r,
        Tool::Waybackurls,
        Tool::Gau,
        Tool::Gospider,
        Tool::Gf,
        Tool::Nuclei,
        Tool::Nmap,
        Tool::Wappalyzer,
        Tool::Feroxbuster,
        Tool::Gobuster,
        Tool::Katana,
        Tool::Hakrawler,
        Tool::JwtTool,
    ];

    pub fn binary(&self) -> &'static str {
        match self {
            Tool::Subfinder => "subfinder",
            Tool::Assetfinder => "assetfinder",
            Tool::Amass => "amass",
            Tool::Chaos => "chaos",
            Tool::Sublist3r => "sublist3r",
            Tool::Waybackurls => "waybackurls",
            Tool::Gau => "gau",
            Tool::Gospider => "gospider",
            Tool::Gf => "gf",
            Tool::Nuclei => "nuclei",
            Tool::Nmap => "nmap",
            Tool::Wappalyzer => "wappalyzer",
            Tool::Feroxbuster => "feroxbuster",
            Tool::Gobuster => "gobuster",
            Tool::Katana => "katana",
            Tool::Hakrawler => "hakrawler",
            Tool::JwtTool => "jwt_tool",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.binary())
    }
}

/// What a subdomain source prints on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutput {
    Hostnames,
    Urls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubdomainSource {
    Subfinder,
    Assetfinder,
    Amass,
    Chaos,
    Sublist3r,
    Waybackurls,
    Gau,
}

impl SubdomainSource {
    pub const ALL: [SubdomainSource; 7] = [
        SubdomainSource::Subfinder,
        SubdomainSource::Assetfinder,
        SubdomainSource::Amass,
        SubdomainSource::Chaos,
        SubdomainSource::Sublist3r,
        SubdomainSource::Waybackurls,
        SubdomainSource::Gau,
    ];

    pub fn tool(&self) -> Tool {
        match self {
            SubdomainSource::Subfinder => Tool::Subfinder,
            SubdomainSource::Assetfinder => Tool::Assetfinder,
            SubdomainSource::Amass => Tool::Amass,
            SubdomainSource::Chaos => Tool::Chaos,
            SubdomainSource::Sublist3r => Tool::Sublist3r,
            SubdomainSource::Waybackurls => Tool::Waybackurls,
            SubdomainSource::Gau => Tool::Gau,
        }
    }

    pub fn output(&self) -> SourceOutput {
        match self {
            SubdomainSource::Waybackurls | SubdomainSource::Gau => SourceOutput::Urls,
            _ => SourceOutput::Hostnames,
        }
    }

    pub fn command(&self, domain: &str) -> ToolCommand {
        let cmd = ToolCommand::new(self.tool().binary());
        match self {
            SubdomainSource::Subfinder => cmd.args(["-d", domain, "-silent"]),
            SubdomainSource::Assetfinder => cmd.args(["--subs-only", domain]),
            SubdomainSource::Amass => cmd.args(["enum", "-passive", "-d", domain]),
            SubdomainSource::Chaos => cmd.args(["-d", domain, "-silent"]),
            SubdomainSource::Sublist3r => cmd.args(["-d", domain, "-n"]),
            SubdomainSource::Waybackurls => cmd.arg(domain),
            SubdomainSource::Gau => cmd.args(["--subs", domain]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlSource {
    Gau,
    Waybackurls,
    Gospider,
}

impl UrlSource {
    pub const ALL: [UrlSource; 3] = [UrlSource::Gau, UrlSource::Waybackurls, UrlSource::Gospider];

    pub fn tool(&self) -> Tool {
        match self {
            UrlSource::Gau => Tool::Gau,
            UrlSource::Waybackurls => Tool::Waybackurls,
            UrlSource::Gospider => Tool::Gospider,
        }
    }

    pub fn command(&self, host: &str) -> ToolCommand {
        let cmd = ToolCommand::new(self.tool().binary());
        match self {
            UrlSource::Gau => cmd.arg(host),
            UrlSource::Waybackurls => cmd.arg(host),
            UrlSource::Gospider => cmd.args(["-s".to_string(), format!("http://{}", host), "-q".to_string()]),
        }
    }
}

/// What a content source prints on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOutput {
    Urls,
    /// `/path (Status: 200) [Size: 12]` lines relative to the base URL.
    StatusPaths,
}

/// Crawlers and path brute-forcers run against `https://<host>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Feroxbuster,
    Gobuster,
    Katana,
    Hakrawler,
}

impl ContentSource {
    pub const ALL: [ContentSource; 4] =
        [ContentSource::Feroxbuster, ContentSource::Gobuster, ContentSource::Katana, ContentSource::Hakrawler];

    pub fn tool(&self) -> Tool {
        match self {
            ContentSource::Feroxbuster => Tool::Feroxbuster,
            ContentSource::Gobuster => Tool::Gobuster,
            ContentSource::Katana => Tool::Katana,
            ContentSource::Hakrawler => Tool::Hakrawler,
        }
    }

    pub fn output(&self) -> ContentOutput {
        match self {
            ContentSource::Gobuster => ContentOutput::StatusPaths,
            _ => ContentOutput::Urls,
        }
    }

    /// gobuster ships no default wordlist.
    pub fn needs_wordlist(&self) -> bool {
        matches!(self, ContentSource::Gobuster)
    }

    pub fn command(&self, base_url: &str, depth: u32, wordlist: Option<&Path>) -> ToolCommand {
        let cmd = ToolCommand::new(self.tool().binary());
        let depth = depth.to_string();
        match self {
            ContentSource::Feroxbuster => {
                let cmd = cmd.args([
                    "--url",
                    base_url,
                    "--threads",
                    "10",
                    "--depth",
                    depth.as_str(),
                    "--filter-status",
                    "404",
                    "--silent",
                ]);
                match wordlist {
                    Some(path) => cmd.arg("--wordlist").arg(path.display().to_string()),
                    None => cmd,
                }
            }
            ContentSource::Gobuster => {
                let cmd = cmd.args(["dir", "-u", base_url, "-t", "10", "-q", "--no-error"]);
                match wordlist {
                    Some(path) => cmd.arg("-w").arg(path.display().to_string()),
                    None => cmd,
                }
            }
            ContentSource::Katana => cmd.args(["-u", base_url, "-jc", "-silent", "-d", depth.as_str()]),
            ContentSource::Hakrawler => cmd.args(["-d", depth.as_str(), "-u"]).stdin(format!("{}\n", base_url)),
        }
    }
}

/// `gf <pattern>` with the URL fed on stdin.
pub fn gf_command(pattern: &str, url: &str) -> ToolCommand {
    ToolCommand::new(Tool::Gf.binary()).arg(pattern).stdin(format!("{}\n", url))
}

pub fn nuclei_command(
    target: &str,
    templates: &[String],
    severities: &[String],
    proxy: Option<&str>,
) -> ToolCommand {
    let mut cmd = ToolCommand::new(Tool::Nuclei.binary()).args(["-target", target]);
    for template in templates {
        cmd = cmd.args(["-t", template.as_str()]);
    }
    if !severities.is_empty() {
        cmd = cmd.args(["-severity".to_string(), severities.join(",")]);
    }
    if let Some(proxy) = proxy {
        cmd = cmd.args(["-proxy", proxy]);
    }
    cmd.args(["-jsonl", "-silent"])
}

/// Service scan of the top ports in grepable output on stdout.
pub fn nmap_command(host: &str, top_ports: u32) -> ToolCommand {
    ToolCommand::new(Tool::Nmap.binary()).args([
        "-sV".to_string(),
        "--top-ports".to_string(),
        top_ports.to_string(),
        "-T4".to_string(),
        "-oG".to_string(),
        "-".to_string(),
        host.to_string(),
    ])
}

pub fn wappalyzer_command(url: &str) -> ToolCommand {
    ToolCommand::new(Tool::Wappalyzer.binary()).arg(url)
}

/// jwt_tool playbook scan replaying `token` as a bearer header against `target`.
pub fn jwt_tool_command(token: &str, target: &str) -> ToolCommand {
    ToolCommand::new(Tool::JwtTool.binary()).args([
        "-t".to_string(),
        target.to_string(),
        "-rh".to_string(),
        format!("Authorization: Bearer {}", token),
        "-M".to_string(),
        "pb".to_string(),
        "-np".to_string(),
    ])
}
