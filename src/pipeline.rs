use std::fmt;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::matcher::NameMatcher;
use crate::registry::{CandidateSite, Registry};

/// Placeholder for sites whose seq or data month is missing, so the lookups
/// could not even be attempted.
pub const NO_SEQ_SENTINEL: &str = "ERROR-NO-SEQ";

const PREFIX_LEN: usize = 6;

/// A company to look up: registration number (at least 6 chars) and name.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyIdentity {
    pub registration_number: String,
    pub name: String,
}

impl CompanyIdentity {
    pub fn new(registration_number: &str, name: &str) -> Result<Self> {
        let registration_number = registration_number.trim();
        let name = name.trim();
        if registration_number.chars().count() < PREFIX_LEN {
            bail!(
                "registration number '{}' is shorter than {} characters",
                registration_number,
                PREFIX_LEN
            );
        }
        if name.is_empty() {
            bail!("company name is empty for '{}'", registration_number);
        }
        Ok(Self {
            registration_number: registration_number.to_string(),
            name: name.to_string(),
        })
    }

    /// Leading 6 characters, the registry's search key.
    pub fn prefix(&self) -> &str {
        match self.registration_number.char_indices().nth(PREFIX_LEN) {
            Some((idx, _)) => &self.registration_number[..idx],
            None => &self.registration_number,
        }
    }
}

/// `YYYYMM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearMonth(String);

impl YearMonth {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let month = s.get(4..).and_then(|m| m.parse::<u32>().ok());
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            bail!("year-month '{}' is not YYYYMM", s);
        }
        if !matches!(month, Some(1..=12)) {
            bail!("year-month '{}' has no valid month", s);
        }
        Ok(Self(s.to_string()))
    }

    pub fn current() -> Self {
        Self(chrono::Local::now().format("%Y%m").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One output line. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    #[serde(rename = "자료생성년월")]
    pub data_year_month: String,
    #[serde(rename = "사업자등록번호")]
    pub registration_number: String,
    #[serde(rename = "사업장명")]
    pub site_name: String,
    #[serde(rename = "전체사원수")]
    pub total_employees: String,
    #[serde(rename = "월별 취업자수")]
    pub monthly_hires: String,
    #[serde(rename = "월별 퇴직자수")]
    pub monthly_separations: String,
}

impl ResultRow {
    pub const HEADERS: [&'static str; 6] = [
        "자료생성년월",
        "사업자등록번호",
        "사업장명",
        "전체사원수",
        "월별 취업자수",
        "월별 퇴직자수",
    ];

    fn unlinked(site: &CandidateSite) -> Self {
        Self {
            data_year_month: site.data_year_month.clone(),
            registration_number: site.registration_number.clone(),
            site_name: site.site_name.clone(),
            total_employees: NO_SEQ_SENTINEL.to_string(),
            monthly_hires: NO_SEQ_SENTINEL.to_string(),
            monthly_separations: NO_SEQ_SENTINEL.to_string(),
        }
    }
}

/// Search, match and enrich business sites for one company at a time.
pub struct Pipeline<'a, R: Registry> {
    registry: &'a R,
    matcher: &'a NameMatcher,
    page_size: usize,
}

impl<'a, R: Registry> Pipeline<'a, R> {
    pub fn new(registry: &'a R, matcher: &'a NameMatcher, page_size: usize) -> Self {
        Self {
            registry,
            matcher,
            page_size: page_size.max(1),
        }
    }

    /// All matched sites for `company`, in page order then in-page order.
    pub fn collect_for_company(
        &self,
        company: &CompanyIdentity,
        year_month: &YearMonth,
    ) -> Vec<ResultRow> {
        let prefix = company.prefix();
        info!("Searching {} ({}) for {}", company.name, prefix, year_month);

        let mut rows = Vec::new();
        let mut page_no = 1;
        loop {
            let page = self.registry.fetch_base_info_page(
                prefix,
                year_month.as_str(),
                page_no,
                self.page_size,
            );
            if page.sites.is_empty() {
                break;
            }
            debug!("page {}: {} candidate sites", page_no, page.sites.len());

            for site in &page.sites {
                if let Some(row) = self.process_site(company, site) {
                    rows.push(row);
                }
            }

            if !page.has_more {
                break;
            }
            page_no += 1;
        }

        info!("{}: {} matching sites", company.name, rows.len());
        rows
    }

    fn process_site(&self, company: &CompanyIdentity, site: &CandidateSite) -> Option<ResultRow> {
        if !site.registration_number.starts_with(company.prefix()) {
            debug!(
                "skip {} - {}: registration number prefix differs",
                site.registration_number, site.site_name
            );
            return None;
        }
        if !self.matcher.matches(&company.name, &site.site_name) {
            debug!(
                "skip {} - {}: name does not match",
                site.registration_number, site.site_name
            );
            return None;
        }
        info!("Matched site {} - {}", site.registration_number, site.site_name);

        let Some((seq, data_ym)) = site.linkage() else {
            info!("Site {} has no seq or data month", site.site_name);
            return Some(ResultRow::unlinked(site));
        };

        let total_employees = self.registry.fetch_detail_info(seq, data_ym);
        let monthly = self.registry.fetch_monthly_status(seq, data_ym);
        debug!(
            "enriched {}: employees={}, hires={}, separations={}",
            site.site_name, total_employees, monthly.new_hires, monthly.separations
        );

        Some(ResultRow {
            data_year_month: site.data_year_month.clone(),
            registration_number: site.registration_number.clone(),
            site_name: site.site_name.clone(),
            total_employees,
            monthly_hires: monthly.new_hires,
            monthly_separations: monthly.separations,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use httpmock::prelude::*;

    use super::*;
    use crate::matcher::DEFAULT_CORPORATE_MARKERS;
    use crate::registry::{BasePage, MonthlyStatus, RegistryClient};
    use crate::settings::Settings;

    /// In-memory registry that records every call.
    #[derive(Default)]
    struct FakeRegistry {
        pages: Vec<Vec<CandidateSite>>,
        headcounts: HashMap<String, String>,
        monthly: HashMap<String, MonthlyStatus>,
        calls: RefCell<Vec<String>>,
    }

    impl Registry for FakeRegistry {
        fn fetch_base_info_page(
            &self,
            prefix: &str,
            year_month: &str,
            page_no: u32,
            page_size: usize,
        ) -> BasePage {
            self.calls
                .borrow_mut()
                .push(format!("base:{prefix}:{year_month}:{page_no}"));
            let sites = self
                .pages
                .get(page_no as usize - 1)
                .cloned()
                .unwrap_or_default();
            BasePage::new(sites, page_size)
        }

        fn fetch_detail_info(&self, seq: &str, year_month: &str) -> String {
            self.calls.borrow_mut().push(format!("detail:{seq}:{year_month}"));
            self.headcounts.get(seq).cloned().unwrap_or_default()
        }

        fn fetch_monthly_status(&self, seq: &str, year_month: &str) -> MonthlyStatus {
            self.calls.borrow_mut().push(format!("monthly:{seq}:{year_month}"));
            self.monthly.get(seq).cloned().unwrap_or_default()
        }
    }

    impl FakeRegistry {
        fn base_calls(&self) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.starts_with("base:"))
                .count()
        }
    }

    fn site(name: &str, regno: &str, seq: &str) -> CandidateSite {
        CandidateSite {
            site_name: name.into(),
            registration_number: regno.into(),
            data_year_month: "202504".into(),
            seq: seq.into(),
        }
    }

    fn company() -> CompanyIdentity {
        CompanyIdentity::new("1208173505", "테스트회사").unwrap()
    }

    fn ym() -> YearMonth {
        YearMonth::parse("202504").unwrap()
    }

    fn status(hires: &str, separations: &str) -> MonthlyStatus {
        MonthlyStatus {
            new_hires: hires.into(),
            separations: separations.into(),
        }
    }

    #[test]
    fn single_match_is_enriched() {
        let registry = FakeRegistry {
            pages: vec![vec![site("(주)테스트회사", "120817****", "1001")]],
            headcounts: HashMap::from([("1001".to_string(), "10".to_string())]),
            monthly: HashMap::from([("1001".to_string(), status("2", "1"))]),
            ..Default::default()
        };
        let matcher = NameMatcher::new(DEFAULT_CORPORATE_MARKERS, 2).unwrap();
        let rows = Pipeline::new(&registry, &matcher, 100).collect_for_company(&company(), &ym());

        assert_eq!(
            rows,
            vec![ResultRow {
                data_year_month: "202504".into(),
                registration_number: "120817****".into(),
                site_name: "(주)테스트회사".into(),
                total_employees: "10".into(),
                monthly_hires: "2".into(),
                monthly_separations: "1".into(),
            }]
        );
        assert_eq!(
            *registry.calls.borrow(),
            vec![
                "base:120817:202504:1".to_string(),
                "detail:1001:202504".to_string(),
                "monthly:1001:202504".to_string(),
            ]
        );
    }

    #[test]
    fn failed_detail_keeps_monthly_counts() {
        let registry = FakeRegistry {
            pages: vec![vec![site("테스트회사", "120817****", "1001")]],
            monthly: HashMap::from([("1001".to_string(), status("2", "1"))]),
            ..Default::default()
        };
        let matcher = NameMatcher::new(DEFAULT_CORPORATE_MARKERS, 2).unwrap();
        let rows = Pipeline::new(&registry, &matcher, 100).collect_for_company(&company(), &ym());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_employees, "");
        assert_eq!(rows[0].monthly_hires, "2");
        assert_eq!(rows[0].monthly_separations, "1");
    }

    #[test]
    fn missing_seq_uses_sentinel_without_lookups() {
        let mut no_month = site("테스트 지점", "120817****", "1002");
        no_month.data_year_month.clear();
        let registry = FakeRegistry {
            pages: vec![vec![site("테스트회사", "120817****", ""), no_month]],
            ..Default::default()
        };
        let matcher = NameMatcher::new(DEFAULT_CORPORATE_MARKERS, 2).unwrap();
        let rows = Pipeline::new(&registry, &matcher, 100).collect_for_company(&company(), &ym());

        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.total_employees, NO_SEQ_SENTINEL);
            assert_eq!(row.monthly_hires, NO_SEQ_SENTINEL);
            assert_eq!(row.monthly_separations, NO_SEQ_SENTINEL);
        }
        assert_eq!(rows[1].data_year_month, "");
        assert_eq!(registry.base_calls(), registry.calls.borrow().len());
    }

    #[test]
    fn prefix_mismatch_never_matches() {
        let registry = FakeRegistry {
            pages: vec![vec![
                site("테스트회사", "999999****", "1"),
                site("테스트회사", "12081*****", "2"),
                site("", "", "3"),
            ]],
            headcounts: HashMap::from([("1".to_string(), "10".to_string())]),
            ..Default::default()
        };
        let matcher = NameMatcher::new(DEFAULT_CORPORATE_MARKERS, 2).unwrap();
        let rows = Pipeline::new(&registry, &matcher, 100).collect_for_company(&company(), &ym());

        assert!(rows.is_empty());
        assert_eq!(registry.calls.borrow().len(), 1);
    }

    #[test]
    fn name_mismatch_is_skipped() {
        let registry = FakeRegistry {
            pages: vec![vec![
                site("엘지화학", "120817****", "1"),
                site("테스트 물류", "120817****", "2"),
            ]],
            ..Default::default()
        };
        let matcher = NameMatcher::new(DEFAULT_CORPORATE_MARKERS, 2).unwrap();
        let rows = Pipeline::new(&registry, &matcher, 100).collect_for_company(&company(), &ym());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].site_name, "테스트 물류");
    }

    #[test]
    fn paginates_until_short_page() {
        let registry = FakeRegistry {
            pages: vec![
                vec![site("테스트 A", "120817****", "1"), site("테스트 B", "120817****", "2")],
                vec![site("테스트 C", "120817****", "3"), site("무관", "120817****", "4")],
                vec![site("테스트 E", "120817****", "5")],
            ],
            ..Default::default()
        };
        let matcher = NameMatcher::new(DEFAULT_CORPORATE_MARKERS, 2).unwrap();
        let rows = Pipeline::new(&registry, &matcher, 2).collect_for_company(&company(), &ym());

        let names: Vec<&str> = rows.iter().map(|r| r.site_name.as_str()).collect();
        assert_eq!(names, vec!["테스트 A", "테스트 B", "테스트 C", "테스트 E"]);
        assert_eq!(registry.base_calls(), 3);
    }

    #[test]
    fn exact_multiple_needs_one_extra_call() {
        // 4 known items, page size 2: ceil(4/2) + 1 calls.
        let registry = FakeRegistry {
            pages: vec![
                vec![site("테스트 A", "120817****", "1"), site("테스트 B", "120817****", "2")],
                vec![site("테스트 C", "120817****", "3"), site("테스트 D", "120817****", "4")],
            ],
            ..Default::default()
        };
        let matcher = NameMatcher::new(DEFAULT_CORPORATE_MARKERS, 2).unwrap();
        let rows = Pipeline::new(&registry, &matcher, 2).collect_for_company(&company(), &ym());

        assert_eq!(rows.len(), 4);
        assert_eq!(registry.base_calls(), 3);
    }

    #[test]
    fn empty_first_page_stops_after_one_call() {
        let registry = FakeRegistry::default();
        let matcher = NameMatcher::new(DEFAULT_CORPORATE_MARKERS, 2).unwrap();
        let rows = Pipeline::new(&registry, &matcher, 100).collect_for_company(&company(), &ym());

        assert!(rows.is_empty());
        assert_eq!(*registry.calls.borrow(), vec!["base:120817:202504:1".to_string()]);
    }

    #[test]
    fn identity_requires_six_chars_and_name() {
        assert!(CompanyIdentity::new("12345", "가나").is_err());
        assert!(CompanyIdentity::new("123456", "  ").is_err());
        let c = CompanyIdentity::new(" 1208173505 ", " 가나 ").unwrap();
        assert_eq!(c.prefix(), "120817");
        assert_eq!(c.name, "가나");
        assert_eq!(CompanyIdentity::new("123456", "x").unwrap().prefix(), "123456");
    }

    #[test]
    fn year_month_validation() {
        assert_eq!(YearMonth::parse("202504").unwrap().as_str(), "202504");
        assert!(YearMonth::parse("2025-04").is_err());
        assert!(YearMonth::parse("20254").is_err());
        assert!(YearMonth::parse("202513").is_err());
        assert!(YearMonth::parse("202500").is_err());
        assert_eq!(YearMonth::current().as_str().len(), 6);
    }

    #[test]
    fn headers_follow_field_order() {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.serialize(ResultRow::unlinked(&site("가나", "120817****", ""))).unwrap();
        let out = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let header = out.lines().next().unwrap();
        assert_eq!(header, ResultRow::HEADERS.join(","));
    }

    fn xml_response(body: &str) -> String {
        format!(
            "<response><header><resultCode>00</resultCode><resultMsg>NORMAL SERVICE.</resultMsg>\
             </header><body>{body}</body></response>"
        )
    }

    fn xml_site(name: &str, seq: &str) -> String {
        format!(
            "<item><dataCrtYm>202504</dataCrtYm><seq>{seq}</seq>\
             <wkplNm>{name}</wkplNm><bzowrRgstNo>120817****</bzowrRgstNo></item>"
        )
    }

    #[test]
    fn enriches_over_http_across_pages() {
        let server = MockServer::start();
        let page1 = server.mock(|when, then| {
            when.method(GET)
                .path("/getBassInfoSearch")
                .query_param("bzowr_rgst_no", "120817")
                .query_param("numOfRows", "2")
                .query_param("pageNo", "1");
            then.status(200).body(xml_response(&format!(
                "<items>{}{}</items><totalCount>3</totalCount>",
                xml_site("(주)테스트회사", "1001"),
                xml_site("무관상사", "1002"),
            )));
        });
        let page2 = server.mock(|when, then| {
            when.method(GET)
                .path("/getBassInfoSearch")
                .query_param("pageNo", "2");
            then.status(200).body(xml_response(&format!(
                "<items>{}</items><totalCount>3</totalCount>",
                xml_site("테스트 지점", "1003"),
            )));
        });
        let detail_ok = server.mock(|when, then| {
            when.method(GET).path("/getDetailInfoSearch").query_param("seq", "1001");
            then.status(200)
                .body(xml_response("<item><jnngpCnt>10</jnngpCnt></item>"));
        });
        let detail_down = server.mock(|when, then| {
            when.method(GET).path("/getDetailInfoSearch").query_param("seq", "1003");
            then.status(503);
        });
        server.mock(|when, then| {
            when.method(GET).path("/getPdAcctoSttusInfoSearch").query_param("seq", "1001");
            then.status(200).body(xml_response(
                "<items><item><nwAcqzrCnt>2</nwAcqzrCnt><lssJnngpCnt>1</lssJnngpCnt></item></items>\
                 <totalCount>1</totalCount>",
            ));
        });
        server.mock(|when, then| {
            when.method(GET).path("/getPdAcctoSttusInfoSearch").query_param("seq", "1003");
            then.status(200).body(xml_response(
                "<items><item><nwAcqzrCnt>3</nwAcqzrCnt><lssJnngpCnt>0</lssJnngpCnt></item></items>\
                 <totalCount>1</totalCount>",
            ));
        });

        let settings = Settings {
            api_key: "test-key".into(),
            base_url: server.base_url(),
            request_delay_ms: 0,
            ..Settings::default()
        };
        let client = RegistryClient::new(&settings).unwrap();
        let matcher = NameMatcher::new(DEFAULT_CORPORATE_MARKERS, 2).unwrap();
        let rows = Pipeline::new(&client, &matcher, 2).collect_for_company(&company(), &ym());

        page1.assert();
        page2.assert();
        detail_ok.assert();
        detail_down.assert();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            ResultRow {
                data_year_month: "202504".into(),
                registration_number: "120817****".into(),
                site_name: "(주)테스트회사".into(),
                total_employees: "10".into(),
                monthly_hires: "2".into(),
                monthly_separations: "1".into(),
            }
        );
        assert_eq!(rows[1].site_name, "테스트 지점");
        assert_eq!(rows[1].total_employees, "");
        assert_eq!(rows[1].monthly_hires, "3");
        assert_eq!(rows[1].monthly_separations, "0");
    }
}
