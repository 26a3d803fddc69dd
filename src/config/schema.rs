use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "scan": {
                "type": "object",
                "properties": {
                    "max_concurrent_requests": { "type": "integer", "minimum": 1 },
                    "request_timeout_secs": { "type": "integer", "minimum": 1 },
                    "follow_redirects": { "type": "boolean" },
                    "verify_tls": { "type": "boolean" },
                    "user_agent": { "type": "string" },
                    "probe_timeout_secs": { "type": "integer", "minimum": 1 },
                    "probe_concurrency": { "type": "integer", "minimum": 1 },
                    "enable_port_scan": { "type": "boolean" },
                    "enable_tech_detection": { "type": "boolean" },
                    "enable_content_discovery": { "type": "boolean" },
                    "enable_vulnerability_scan": { "type": "boolean" },
                    "enable_jwt_analysis": { "type": "boolean" }
                }
            },
            "proxy": {
                "type": "object",
                "properties": {
                    "url": { "type": ["string", "null"] }
                }
            },
            "resilience": {
                "type": "object",
                "properties": {
                    "max_retries": { "type": "integer", "minimum": 0 },
                    "retry_delay_secs": { "type": "number", "minimum": 0 },
                    "max_delay_secs": { "type": "number", "minimum": 0 },
                    "backoff_factor": { "type": "number", "minimum": 1 },
                    "backoff_strategy": { "type": "string", "enum": ["exponential", "linear", "fibonacci"] },
                    "jitter": { "type": "boolean" },
                    "retryable_statuses": { "type": "array", "items": { "type": "integer" } },
                    "breaker_failure_threshold": { "type": "integer", "minimum": 1 },
                    "breaker_reset_timeout_secs": { "type": "integer", "minimum": 0 }
                }
            },
            "tools": {
                "type": "object",
                "properties": {
                    "bin_dir": { "type": ["string", "null"] },
                    "search_path": { "type": "boolean" },
                    "max_concurrent": { "type": "integer", "minimum": 1 },
                    "timeout_secs": { "type": "integer", "minimum": 1 },
                    "subdomain_sources": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["subfinder", "assetfinder", "amass", "chaos", "sublist3r", "waybackurls", "gau"]
                        }
                    },
                    "url_sources": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["gau", "waybackurls", "gospider"] }
                    },
                    "content_sources": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["feroxbuster", "gobuster", "katana", "hakrawler"] }
                    },
                    "wordlist": { "type": ["string", "null"] },
                    "crawl_depth": { "type": "integer", "minimum": 1 },
                    "jwt_max_tokens": { "type": "integer", "minimum": 1 },
                    "nuclei_templates": { "type": "array", "items": { "type": "string" } },
                    "nuclei_severity": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["info", "low", "medium", "high", "critical"] }
                    },
                    "gf_patterns": { "type": "array", "items": { "type": "string" } },
                    "nmap_top_ports": { "type": "integer", "minimum": 1 }
                }
            },
            "fuzz": {
                "type": "object",
                "properties": {
                    "similarity_threshold": { "type": "number", "minimum": 0, "maximum": 1 },
                    "concurrency": { "type": "integer", "minimum": 1 },
                    "parameter_concurrency": { "type": "integer", "minimum": 1 },
                    "similarity_timeout_ms": { "type": "integer", "minimum": 1 },
                    "payload_dir": { "type": ["string", "null"] },
                    "error_signatures": {
                        "type": ["object", "null"],
                        "additionalProperties": { "type": "array", "items": { "type": "string" } }
                    },
                    "corroborate": { "type": "boolean" }
                }
            },
            "output": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" }
                }
            }
        }
    })
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_compiles() {
        assert!(jsonschema::JSONSchema::compile(&CONFIG_SCHEMA).is_ok());
    }

    #[test]
    fn test_schema_flags_unknown_section() {
        let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA).unwrap();
        assert!(!compiled.is_valid(&json!({ "llm": {} })));
        assert!(compiled.is_valid(&json!({ "fuzz": { "similarity_threshold": 0.5 } })));
    }
}
