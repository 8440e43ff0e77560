//! Relevance classifier for discovered standards.
//!
//! Pure functions over `(code, title)`: whether a candidate belongs in the occupational-health
//! catalog, and which category it is filed under. Category rules are evaluated in order and the
//! first match wins.

use once_cell::sync::Lazy;
use regex::Regex;

pub const CATEGORY_DIAGNOSIS: &str = "职业病诊断";
pub const CATEGORY_SURVEILLANCE: &str = "职业健康监护";
pub const CATEGORY_WORKPLACE: &str = "工作场所监测";
pub const CATEGORY_BASIC: &str = "基础标准";
pub const CATEGORY_SIGNAGE: &str = "警示标识";
pub const CATEGORY_PROTECTION: &str = "个体防护";
pub const CATEGORY_TECHNICAL: &str = "技术规范与导则";
pub const CATEGORY_HYGIENE: &str = "卫生标准";

/// Catch-all category.
pub const DEFAULT_CATEGORY: &str = CATEGORY_TECHNICAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub relevant: bool,
    pub category: &'static str,
}

struct CategoryRule {
    code: Option<Regex>,
    title: Option<Regex>,
    category: &'static str,
}

impl CategoryRule {
    fn new(code: Option<&str>, title: Option<&str>, category: &'static str) -> Self {
        CategoryRule {
            code: code.map(|p| Regex::new(p).expect("static regex")),
            title: title.map(|p| Regex::new(p).expect("static regex")),
            category,
        }
    }

    fn matches(&self, code: &str, title: &str) -> bool {
        self.code.as_ref().map(|re| re.is_match(code)).unwrap_or(true)
            && self.title.as_ref().map(|re| re.is_match(title)).unwrap_or(true)
    }
}

static CATEGORY_RULES: Lazy<Vec<CategoryRule>> = Lazy::new(|| {
    vec![
        CategoryRule::new(Some(r"GBZ\s*\d"), Some("诊断"), CATEGORY_DIAGNOSIS),
        CategoryRule::new(Some(r"GBZ/T\s*188"), None, CATEGORY_SURVEILLANCE),
        CategoryRule::new(Some(r"GBZ/T\s*189"), None, CATEGORY_WORKPLACE),
        CategoryRule::new(Some(r"GBZ/T\s*229"), None, CATEGORY_DIAGNOSIS),
        CategoryRule::new(Some(r"GBZ/T\s*300"), None, CATEGORY_WORKPLACE),
        CategoryRule::new(Some(r"GBZ\s*[12]-"), None, CATEGORY_BASIC),
        CategoryRule::new(Some(r"GBZ\s*158"), None, CATEGORY_SIGNAGE),
        CategoryRule::new(None, Some("防护|护听"), CATEGORY_PROTECTION),
        CategoryRule::new(None, Some("测听|听力|听阈|声学"), CATEGORY_TECHNICAL),
        CategoryRule::new(None, Some("噪声|粉尘|化学|毒物"), CATEGORY_WORKPLACE),
        CategoryRule::new(None, Some("限值|接触"), CATEGORY_BASIC),
        CategoryRule::new(Some("WS"), None, CATEGORY_HYGIENE),
    ]
});

static HYGIENE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new("职业|卫生|防护|健康监护").expect("static regex"));

/// Title vocabulary that marks a standard as in-domain regardless of its code.
static DOMAIN_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        "声学|噪声|听力|听阈|测听|护听|助听",
        "|职业病|职业健康|职业卫生|职业暴露|职业防护",
        "|工作场所|劳动防护|个体防护",
        "|粉尘|尘肺|矽肺|化学毒物|中毒|放射|辐射",
    ))
    .expect("static regex")
});

pub fn is_relevant(code: &str, title: &str) -> bool {
    let code = code.trim();
    if code.starts_with("GBZ") {
        return true;
    }
    if code.starts_with("WS") && HYGIENE_TITLE.is_match(title) {
        return true;
    }
    DOMAIN_TITLE.is_match(title)
}

pub fn categorize(code: &str, title: &str) -> &'static str {
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.matches(code, title))
        .map(|rule| rule.category)
        .unwrap_or(DEFAULT_CATEGORY)
}

pub fn classify(code: &str, title: &str) -> Classification {
    Classification {
        relevant: is_relevant(code, title),
        category: categorize(code, title),
    }
}
