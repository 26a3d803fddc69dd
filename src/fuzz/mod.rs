pub mod analyzer;
pub mod corroborate;
pub mod fuzzer;
pub mod jwt;
pub mod payloads;
pub mod signatures;

pub use analyzer::{analyze, Analysis, AnalysisSettings, Baseline};
pub use corroborate::{Corroborator, TemplateScanner, ToolCorroborator};
pub use fuzzer::{build_request_url, FuzzSettings, Fuzzer, ParameterOutcome};
pub use jwt::JwtAnalyzer;
pub use payloads::{PayloadCatalog, PayloadCategory};
pub use signatures::ErrorSignatures;
