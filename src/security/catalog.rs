//! Vulnerability pattern catalog
//!
//! Every rule is plain data: a regex plus the severity, confidence and CWE
//! of its class. Several rules may share a class (one per language idiom);
//! findings are deduplicated per class, not per rule.

use crate::models::{Confidence, Cwe, Severity};
use crate::parsers::Language;
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;
use tracing::warn;

use Language::{Go, Java, JavaScript, Python, Rust, TypeScript};

const JS_TS: &[Language] = &[JavaScript, TypeScript];
const ALL: &[Language] = &[];

/// One catalog entry
#[derive(Debug)]
pub struct Rule {
    /// Unique rule id
    pub id: &'static str,
    /// Pattern class; the deduplication key together with file and line
    pub class: &'static str,
    pub title: &'static str,
    /// Languages the rule applies to; empty means all
    pub languages: &'static [Language],
    /// Matched case-insensitively unless it opts out with `(?-i)`
    pub pattern: &'static str,
    /// Lines matching this are not findings
    pub exclude: Option<&'static str>,
    pub severity: Severity,
    pub confidence: Confidence,
    pub cwe: Option<u32>,
    /// Whether comment-only lines are scanned too
    pub in_comments: bool,
    pub description: &'static str,
    pub recommendation: &'static str,
}

impl Rule {
    pub fn applies_to(&self, language: Language) -> bool {
        self.languages.is_empty() || self.languages.contains(&language)
    }

    pub fn cwe(&self) -> Option<Cwe> {
        self.cwe.filter(|n| *n > 0).map(Cwe)
    }
}

pub static RULES: &[Rule] = &[
    // Credentials
    Rule {
        id: "hardcoded-password",
        class: "hardcoded-password",
        title: "Hardcoded password",
        languages: ALL,
        pattern: r#"(password|passwd|pwd)\w*\s*[:=]\s*["'][^"'\s]{4,}["']"#,
        exclude: Some(r#"(?i)["'](changeme|password|\*+|x+|<[^>]*>|\$\{[^}]*\})["']"#),
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(798),
        in_comments: true,
        description: "A password literal is assigned in source code.",
        recommendation: "Load credentials from environment variables or a secrets manager.",
    },
    Rule {
        id: "hardcoded-secret",
        class: "hardcoded-secret",
        title: "Hardcoded API key or secret",
        languages: ALL,
        pattern: r#"(api[_-]?key|secret[_-]?key|client[_-]?secret|access[_-]?token|auth[_-]?token|secret)\s*[:=]\s*["'][A-Za-z0-9_\-/+=.]{12,}["']"#,
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(798),
        in_comments: true,
        description: "An API key, token or secret literal is embedded in source code.",
        recommendation: "Rotate the secret and read it from configuration at runtime.",
    },
    Rule {
        id: "private-key-block",
        class: "private-key",
        title: "Private key committed to source",
        languages: ALL,
        pattern: r"-----BEGIN (RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----",
        exclude: None,
        severity: Severity::Critical,
        confidence: Confidence::High,
        cwe: Some(321),
        in_comments: true,
        description: "A PEM private key block appears in the source tree.",
        recommendation: "Remove the key from history, revoke it and store keys outside the repository.",
    },
    Rule {
        id: "aws-access-key",
        class: "aws-access-key",
        title: "AWS access key ID",
        languages: ALL,
        pattern: r"(?-i)\bAKIA[0-9A-Z]{16}\b",
        exclude: None,
        severity: Severity::Critical,
        confidence: Confidence::High,
        cwe: Some(798),
        in_comments: true,
        description: "An AWS access key ID is embedded in source code.",
        recommendation: "Deactivate the key in IAM and use role-based credentials.",
    },
    // Injection
    Rule {
        id: "sql-injection-python",
        class: "sql-injection",
        title: "SQL built from string formatting",
        languages: &[Python],
        pattern: r#"\.(execute|executemany|raw)\s*\(\s*(f["']|["'][^"']*["']\s*(%|\+|\.format))"#,
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(89),
        in_comments: false,
        description: "A SQL statement is assembled with string interpolation before execution.",
        recommendation: "Use parameterized queries and pass values as bound parameters.",
    },
    Rule {
        id: "sql-injection-js",
        class: "sql-injection",
        title: "SQL built from string concatenation",
        languages: JS_TS,
        pattern: r#"\.(query|execute|raw)\s*\(\s*(`[^`]*\$\{|["'][^"']*["']\s*\+)"#,
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(89),
        in_comments: false,
        description: "A SQL statement is assembled from template literals or concatenation.",
        recommendation: "Use placeholders (`?`, `$1`) and pass values separately.",
    },
    Rule {
        id: "sql-injection-java",
        class: "sql-injection",
        title: "SQL built from string concatenation",
        languages: &[Java],
        pattern: r#"\.(executeQuery|executeUpdate|execute|prepareStatement|createQuery)\s*\(\s*"[^"]*"\s*\+"#,
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(89),
        in_comments: false,
        description: "A JDBC statement is assembled by string concatenation.",
        recommendation: "Use PreparedStatement with `?` placeholders.",
    },
    Rule {
        id: "sql-injection-go",
        class: "sql-injection",
        title: "SQL built from string formatting",
        languages: &[Go],
        pattern: r#"\.(Query|QueryRow|Exec|QueryContext|ExecContext)\s*\(\s*(ctx\s*,\s*)?(fmt\.Sprintf|"[^"]*"\s*\+)"#,
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(89),
        in_comments: false,
        description: "A database/sql query is assembled with Sprintf or concatenation.",
        recommendation: "Pass arguments as query parameters instead of formatting them in.",
    },
    Rule {
        id: "command-injection-python",
        class: "command-injection",
        title: "Shell command execution",
        languages: &[Python],
        pattern: r"\bos\.(system|popen)\s*\(|\bsubprocess\.\w+\(.*shell\s*=\s*True|\bcommands\.getoutput\s*\(",
        exclude: None,
        severity: Severity::Critical,
        confidence: Confidence::Medium,
        cwe: Some(78),
        in_comments: false,
        description: "A command is run through the shell, where arguments can inject commands.",
        recommendation: "Call subprocess with an argument list and shell=False.",
    },
    Rule {
        id: "command-injection-js",
        class: "command-injection",
        title: "Shell command execution",
        languages: JS_TS,
        pattern: r#"\b(child_process\.)?(exec|execSync)\s*\(\s*(`[^`]*\$\{|["'][^"']*["']\s*\+|[A-Za-z_]\w*\s*[,)+])"#,
        exclude: Some(r"\.exec\s*\(|\bregex|\bRegExp"),
        severity: Severity::Critical,
        confidence: Confidence::Medium,
        cwe: Some(78),
        in_comments: false,
        description: "child_process.exec runs a dynamically built command through the shell.",
        recommendation: "Use execFile/spawn with an argument array.",
    },
    Rule {
        id: "command-injection-java",
        class: "command-injection",
        title: "Runtime command execution",
        languages: &[Java],
        pattern: r"Runtime\.getRuntime\(\)\.exec\s*\(",
        exclude: None,
        severity: Severity::Critical,
        confidence: Confidence::Medium,
        cwe: Some(78),
        in_comments: false,
        description: "Runtime.exec runs an OS command that may include untrusted input.",
        recommendation: "Use ProcessBuilder with a fixed command and validated arguments.",
    },
    Rule {
        id: "command-injection-go",
        class: "command-injection",
        title: "Shell command execution",
        languages: &[Go],
        pattern: r#"exec\.Command(Context)?\(\s*(ctx\s*,\s*)?"(sh|bash|cmd|cmd\.exe|powershell)""#,
        exclude: None,
        severity: Severity::Critical,
        confidence: Confidence::Medium,
        cwe: Some(78),
        in_comments: false,
        description: "A command string is handed to a shell interpreter.",
        recommendation: "Invoke the binary directly with separate arguments.",
    },
    // Deserialization
    Rule {
        id: "unsafe-pickle",
        class: "unsafe-pickle",
        title: "Unsafe deserialization with pickle",
        languages: &[Python],
        pattern: r"\b(c?pickle|dill|shelve|marshal)\.(loads?|Unpickler|open)\b",
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(502),
        in_comments: false,
        description: "Unpickling untrusted data can execute arbitrary code.",
        recommendation: "Use a data-only format such as JSON for untrusted input.",
    },
    Rule {
        id: "unsafe-yaml",
        class: "unsafe-yaml",
        title: "Unsafe YAML loading",
        languages: &[Python],
        pattern: r"\byaml\.(unsafe_load|load_all|load)\s*\(",
        exclude: Some(r"SafeLoader|CSafeLoader|BaseLoader"),
        severity: Severity::Medium,
        confidence: Confidence::Medium,
        cwe: Some(502),
        in_comments: false,
        description: "yaml.load without a safe loader can construct arbitrary objects.",
        recommendation: "Use yaml.safe_load or pass Loader=yaml.SafeLoader.",
    },
    Rule {
        id: "java-deserialization",
        class: "object-deserialization",
        title: "Java object deserialization",
        languages: &[Java],
        pattern: r"new\s+ObjectInputStream\s*\(|\.readObject\s*\(\s*\)|XMLDecoder\s*\(",
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(502),
        in_comments: false,
        description: "Native Java deserialization of untrusted streams enables gadget-chain attacks.",
        recommendation: "Avoid ObjectInputStream for untrusted data or apply an ObjectInputFilter.",
    },
    // Dynamic execution
    Rule {
        id: "eval-usage",
        class: "eval-usage",
        title: "Use of eval",
        languages: &[Python, JavaScript, TypeScript],
        pattern: r"(?:^|[^.\w])eval\s*\(",
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(95),
        in_comments: false,
        description: "eval executes strings as code.",
        recommendation: "Parse data explicitly (e.g. ast.literal_eval, JSON.parse) instead of evaluating it.",
    },
    Rule {
        id: "exec-usage",
        class: "exec-usage",
        title: "Use of exec",
        languages: &[Python],
        pattern: r"(?:^|[^.\w])exec\s*\(",
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(95),
        in_comments: false,
        description: "exec runs dynamically constructed Python code.",
        recommendation: "Replace dynamic code execution with explicit dispatch.",
    },
    Rule {
        id: "function-constructor",
        class: "function-constructor",
        title: "Dynamic Function constructor",
        languages: JS_TS,
        pattern: r"new\s+Function\s*\(|set(Timeout|Interval)\s*\(\s*[`'\x22]",
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(95),
        in_comments: false,
        description: "Strings are compiled into executable functions at runtime.",
        recommendation: "Pass real functions instead of source strings.",
    },
    // Cryptography
    Rule {
        id: "weak-hash",
        class: "weak-hash",
        title: "Weak hash algorithm",
        languages: ALL,
        pattern: r#"hashlib\.(md5|sha1)\s*\(|createHash\(\s*["'](md5|sha1)["']|MessageDigest\.getInstance\(\s*"(md5|sha-?1)"|\b(md5|sha1)\.(new|sum)\s*\(|\b(md5::compute|md5::new|sha1::new)\b"#,
        exclude: Some(r"usedforsecurity\s*=\s*False"),
        severity: Severity::Medium,
        confidence: Confidence::Medium,
        cwe: Some(327),
        in_comments: false,
        description: "MD5 and SHA-1 are broken for collision resistance.",
        recommendation: "Use SHA-256 or stronger; use a password hash (argon2, bcrypt) for credentials.",
    },
    Rule {
        id: "weak-cipher",
        class: "weak-cipher",
        title: "Weak cipher or mode",
        languages: ALL,
        pattern: r#"Cipher\.getInstance\(\s*"(des|desede|rc4|rc2|blowfish)|/ECB/|\bMODE_ECB\b|\b(DES|DES3|ARC4|Blowfish)\.new\s*\(|createCipheriv?\(\s*["'](des|rc4|bf)"#,
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(327),
        in_comments: false,
        description: "DES, RC4, Blowfish and ECB mode do not provide adequate confidentiality.",
        recommendation: "Use AES-GCM or ChaCha20-Poly1305.",
    },
    Rule {
        id: "insecure-random",
        class: "insecure-random",
        title: "Non-cryptographic randomness for secrets",
        languages: ALL,
        pattern: r"(token|password|secret|nonce|salt|otp|session)\w*\s*[:=].*(\brandom\.(random|randint|choice|randrange)\s*\(|Math\.random\s*\(|new\s+Random\s*\()",
        exclude: None,
        severity: Severity::Low,
        confidence: Confidence::Medium,
        cwe: Some(330),
        in_comments: false,
        description: "A security-sensitive value is generated with a predictable PRNG.",
        recommendation: "Use the secrets module, crypto.randomBytes or SecureRandom.",
    },
    Rule {
        id: "jwt-unverified",
        class: "jwt-unverified",
        title: "JWT signature not verified",
        languages: ALL,
        pattern: r#"algorithms?\s*[:=]\s*\[?\s*["']none["']|verify_signature["']?\s*:\s*False|\bjwt\.decode\([^)]*verify\s*=\s*False"#,
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(347),
        in_comments: false,
        description: "Tokens are accepted without verifying their signature.",
        recommendation: "Always verify JWT signatures with an explicit algorithm allow-list.",
    },
    // Configuration
    Rule {
        id: "debug-enabled",
        class: "debug-enabled",
        title: "Debug mode enabled",
        languages: ALL,
        pattern: r"(?-i)\bDEBUG\s*=\s*True\b|\.run\([^)]*debug\s*=\s*True|\.setDebug\(\s*true\s*\)",
        exclude: None,
        severity: Severity::Low,
        confidence: Confidence::Medium,
        cwe: Some(489),
        in_comments: false,
        description: "Debug mode exposes stack traces and internals in production.",
        recommendation: "Drive debug flags from environment-specific configuration.",
    },
    Rule {
        id: "assert-security",
        class: "assert-security",
        title: "Assert used for a security check",
        languages: &[Python],
        pattern: r"^\s*assert\s+.*\b(auth|authenticated|permission|is_admin|admin|token|role|allowed)\w*",
        exclude: None,
        severity: Severity::Low,
        confidence: Confidence::Medium,
        cwe: Some(617),
        in_comments: false,
        description: "Assertions are stripped with -O, removing the check entirely.",
        recommendation: "Raise an explicit exception for authorization failures.",
    },
    Rule {
        id: "tls-verification-disabled",
        class: "tls-verification-disabled",
        title: "TLS certificate verification disabled",
        languages: ALL,
        pattern: r#"verify\s*=\s*False|rejectUnauthorized\s*:\s*false|InsecureSkipVerify\s*:\s*true|danger_accept_invalid_certs\s*\(\s*true|NODE_TLS_REJECT_UNAUTHORIZED\s*=\s*["']?0|ssl\._create_unverified_context|CERT_NONE|ALLOW_ALL_HOSTNAME_VERIFIER"#,
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::High,
        cwe: Some(295),
        in_comments: false,
        description: "Certificate validation is turned off, enabling man-in-the-middle attacks.",
        recommendation: "Keep verification on and configure a proper CA bundle.",
    },
    Rule {
        id: "bind-all-interfaces",
        class: "bind-all-interfaces",
        title: "Service bound to all interfaces",
        languages: ALL,
        pattern: r#"["']0\.0\.0\.0(:\d+)?["']"#,
        exclude: None,
        severity: Severity::Low,
        confidence: Confidence::Low,
        cwe: Some(605),
        in_comments: false,
        description: "Listening on 0.0.0.0 exposes the service on every network interface.",
        recommendation: "Bind to a specific interface unless external exposure is intended.",
    },
    Rule {
        id: "cleartext-http",
        class: "cleartext-http",
        title: "Cleartext HTTP URL",
        languages: ALL,
        pattern: r#"["'`]http://[a-z0-9][a-z0-9.-]*"#,
        exclude: Some(r"http://(localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1\]|example\.|www\.w3\.org|schemas\.)|xmlns"),
        severity: Severity::Low,
        confidence: Confidence::Low,
        cwe: Some(319),
        in_comments: false,
        description: "Data sent over plain HTTP can be read and modified in transit.",
        recommendation: "Use HTTPS endpoints.",
    },
    // Web
    Rule {
        id: "inner-html",
        class: "inner-html",
        title: "Assignment to innerHTML",
        languages: JS_TS,
        pattern: r"\.(innerHTML|outerHTML)\s*\+?=|\.insertAdjacentHTML\s*\(",
        exclude: None,
        severity: Severity::Medium,
        confidence: Confidence::Medium,
        cwe: Some(79),
        in_comments: false,
        description: "Writing HTML strings into the DOM enables cross-site scripting.",
        recommendation: "Use textContent or sanitize with a vetted library.",
    },
    Rule {
        id: "document-write",
        class: "document-write",
        title: "Use of document.write",
        languages: JS_TS,
        pattern: r"document\.write(ln)?\s*\(",
        exclude: None,
        severity: Severity::Medium,
        confidence: Confidence::Medium,
        cwe: Some(79),
        in_comments: false,
        description: "document.write injects unescaped markup.",
        recommendation: "Build DOM nodes explicitly.",
    },
    Rule {
        id: "dangerously-set-inner-html",
        class: "dangerously-set-inner-html",
        title: "React dangerouslySetInnerHTML",
        languages: JS_TS,
        pattern: r"dangerouslySetInnerHTML",
        exclude: None,
        severity: Severity::Medium,
        confidence: Confidence::Medium,
        cwe: Some(79),
        in_comments: false,
        description: "Raw HTML is rendered without React's escaping.",
        recommendation: "Sanitize the HTML (e.g. DOMPurify) or render structured content.",
    },
    // Filesystem
    Rule {
        id: "path-traversal",
        class: "path-traversal",
        title: "File access with request-controlled path",
        languages: ALL,
        pattern: r"\bopen\s*\(\s*(request\.|os\.path\.join\([^)]*request\.)|send_file\s*\(\s*request\.|(readFile|readFileSync|createReadStream|sendFile)\s*\([^)]*req\.(params|query|body)|new\s+File(InputStream|Reader)?\s*\([^)]*getParameter\s*\(|os\.(Open|ReadFile)\([^)]*r\.(URL|FormValue)",
        exclude: None,
        severity: Severity::High,
        confidence: Confidence::Medium,
        cwe: Some(22),
        in_comments: false,
        description: "A file path is taken from request data without normalization.",
        recommendation: "Resolve the path and verify it stays under an allowed base directory.",
    },
    Rule {
        id: "insecure-tempfile",
        class: "insecure-tempfile",
        title: "Insecure temporary file",
        languages: &[Python],
        pattern: r"\btempfile\.mktemp\s*\(|\bos\.tempnam\s*\(",
        exclude: None,
        severity: Severity::Medium,
        confidence: Confidence::High,
        cwe: Some(377),
        in_comments: false,
        description: "mktemp returns a name that another process can claim first.",
        recommendation: "Use tempfile.mkstemp or NamedTemporaryFile.",
    },
    Rule {
        id: "unsafe-block",
        class: "unsafe-block",
        title: "Unsafe Rust block",
        languages: &[Rust],
        pattern: r"\bunsafe\s*\{",
        exclude: None,
        severity: Severity::Low,
        confidence: Confidence::Low,
        cwe: None,
        in_comments: false,
        description: "Memory safety inside this block depends on manual invariants.",
        recommendation: "Document the safety invariants and keep unsafe regions minimal.",
    },
];

/// A rule with its compiled patterns
pub struct CompiledRule {
    pub rule: &'static Rule,
    pub regex: Regex,
    pub exclude: Option<Regex>,
}

static COMPILED: OnceLock<Vec<CompiledRule>> = OnceLock::new();

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Compiled catalog, built once per process. Rules whose pattern fails to
/// compile are dropped with a warning.
pub fn compiled_rules() -> &'static [CompiledRule] {
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|rule| {
                let regex = match compile(rule.pattern) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Dropping security rule {}: {}", rule.id, e);
                        return None;
                    }
                };
                let exclude = match rule.exclude.map(compile).transpose() {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Dropping security rule {}: bad exclude: {}", rule.id, e);
                        return None;
                    }
                };
                Some(CompiledRule {
                    rule,
                    regex,
                    exclude,
                })
            })
            .collect()
    })
}

/// Distinct pattern classes in the catalog
pub fn classes() -> Vec<&'static str> {
    let mut classes: Vec<&'static str> = RULES.iter().map(|r| r.class).collect();
    classes.sort_unstable();
    classes.dedup();
    classes
}
