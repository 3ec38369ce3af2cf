use std::sync::LazyLock;

use regex::Regex;

use super::xml::Element;

static JNNGP_CNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<jnngpCnt>(\d+)</jnngpCnt>").unwrap());
static NW_ACQZR_CNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<nwAcqzrCnt>(\d+)</nwAcqzrCnt>").unwrap());
static LSS_JNNGP_CNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<lssJnngpCnt>(\d+)</lssJnngpCnt>").unwrap());

/// One place a field may live in a response.
pub enum Lookup {
    /// Element path; the first segment may appear at any depth.
    Path(&'static [&'static str]),
    /// Pattern over the raw body; capture group 1 is the value.
    Raw(&'static LazyLock<Regex>),
}

/// Total headcount in a detail-info response.
pub static HEADCOUNT: &[Lookup] = &[
    Lookup::Path(&["items", "item", "jnngpCnt"]),
    Lookup::Path(&["body", "item", "jnngpCnt"]),
    Lookup::Path(&["jnngpCnt"]),
    Lookup::Raw(&JNNGP_CNT_RE),
];

/// New enrollees in a monthly-status response.
pub static NEW_HIRES: &[Lookup] = &[
    Lookup::Path(&["items", "item", "nwAcqzrCnt"]),
    Lookup::Path(&["nwAcqzrCnt"]),
    Lookup::Raw(&NW_ACQZR_CNT_RE),
];

/// Lost enrollees in a monthly-status response.
pub static SEPARATIONS: &[Lookup] = &[
    Lookup::Path(&["items", "item", "lssJnngpCnt"]),
    Lookup::Path(&["lssJnngpCnt"]),
    Lookup::Raw(&LSS_JNNGP_CNT_RE),
];

impl Lookup {
    fn find(&self, root: &Element, raw: &str) -> Option<String> {
        match self {
            Lookup::Path(path) => root.find_text(path).map(|t| t.trim().to_string()),
            Lookup::Raw(re) => re.captures(raw).map(|c| c[1].to_string()),
        }
    }
}

/// First non-empty value along `chain`, or an empty string.
pub fn first_non_empty(chain: &[Lookup], root: &Element, raw: &str) -> String {
    chain
        .iter()
        .filter_map(|l| l.find(root, raw))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}
