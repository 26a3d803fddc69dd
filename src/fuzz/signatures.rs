use std::collections::BTreeMap;

/// Error strings that betray a backend failure, grouped by category.
#[derive(Debug, Clone)]
pub struct ErrorSignatures {
    categories: BTreeMap<String, Vec<String>>,
}

impl Default for ErrorSignatures {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ErrorSignatures {
    pub fn builtin() -> Self {
        let table: [(&str, &[&str]); 4] = [
            (
                "database",
                &[
                    "SQL syntax",
                    "mysql_fetch",
                    "You have an error in your SQL syntax",
                    "ORA-01756",
                    "PostgreSQL query failed",
                    "pg_query()",
                    "SQLSTATE[",
                    "Unclosed quotation mark",
                    "sqlite3.OperationalError",
                    "SQLiteException",
                ],
            ),
            (
                "template",
                &[
                    "TemplateSyntaxError",
                    "jinja2.exceptions",
                    "Twig_Error",
                    "freemarker.core",
                    "org.apache.velocity",
                ],
            ),
            (
                "file",
                &[
                    "root:x:0:0",
                    "failed to open stream",
                    "No such file or directory",
                    "include_path",
                    "[boot loader]",
                ],
            ),
            (
                "command",
                &["uid=", "sh: 1:", "command not found", "is not recognized as an internal or external command"],
            ),
        ];

        let categories = table
            .iter()
            .map(|(name, patterns)| (name.to_string(), patterns.iter().map(|p| p.to_string()).collect()))
            .collect();
        Self { categories }
    }

    pub fn from_map(categories: BTreeMap<String, Vec<String>>) -> Self {
        Self { categories }
    }

    /// `"category: pattern"` for every pattern present in `body`.
    pub fn scan(&self, body: &str) -> Vec<String> {
        self.categories
            .iter()
            .flat_map(|(category, patterns)| {
                patterns
                    .iter()
                    .filter(|p| !p.is_empty() && body.contains(p.as_str()))
                    .map(move |p| format!("{}: {}", category, p))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_labels_matches() {
        let sigs = ErrorSignatures::builtin();
        let found = sigs.scan("Warning: You have an error in your SQL syntax near ''' at line 1");
        assert!(found.contains(&"database: SQL syntax".to_string()));
        assert!(found.contains(&"database: You have an error in your SQL syntax".to_string()));
    }

    #[test]
    fn test_scan_clean_body() {
        assert!(ErrorSignatures::builtin().scan("<html>Welcome</html>").is_empty());
    }

    #[test]
    fn test_custom_map_replaces_builtin() {
        let mut map = BTreeMap::new();
        map.insert("custom".to_string(), vec!["BOOM".to_string(), String::new()]);
        let sigs = ErrorSignatures::from_map(map);
        assert_eq!(sigs.scan("xx BOOM xx"), vec!["custom: BOOM"]);
        assert!(sigs.scan("SQL syntax").is_empty());
    }
}
