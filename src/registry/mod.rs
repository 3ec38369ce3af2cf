pub mod error;
pub mod lookup;
pub mod xml;

use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::settings::Settings;
use error::RegistryError;
use xml::Element;

const BASE_INFO_OP: &str = "getBassInfoSearch";
const DETAIL_INFO_OP: &str = "getDetailInfoSearch";
const MONTHLY_STATUS_OP: &str = "getPdAcctoSttusInfoSearch";
const SUCCESS_CODE: &str = "00";

/// One business site from a base-info search page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSite {
    pub site_name: String,
    pub registration_number: String,
    pub data_year_month: String,
    pub seq: String,
}

impl CandidateSite {
    /// `(seq, data_year_month)` when both are present.
    pub fn linkage(&self) -> Option<(&str, &str)> {
        if self.seq.is_empty() || self.data_year_month.is_empty() {
            None
        } else {
            Some((&self.seq, &self.data_year_month))
        }
    }

    fn from_item(item: &Element) -> Self {
        let field = |name: &str| item.child_text(name).unwrap_or_default().trim().to_string();
        Self {
            site_name: field("wkplNm"),
            registration_number: field("bzowrRgstNo"),
            data_year_month: field("dataCrtYm"),
            seq: field("seq"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasePage {
    pub sites: Vec<CandidateSite>,
    pub has_more: bool,
}

impl BasePage {
    pub fn new(sites: Vec<CandidateSite>, page_size: usize) -> Self {
        let has_more = !sites.is_empty() && sites.len() >= page_size;
        Self { sites, has_more }
    }
}

/// Hire/separation counts for one site and month. Empty strings when unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyStatus {
    pub new_hires: String,
    pub separations: String,
}

/// The three registry lookups the pipeline depends on.
pub trait Registry {
    fn fetch_base_info_page(
        &self,
        prefix: &str,
        year_month: &str,
        page_no: u32,
        page_size: usize,
    ) -> BasePage;

    fn fetch_detail_info(&self, seq: &str, year_month: &str) -> String;

    fn fetch_monthly_status(&self, seq: &str, year_month: &str) -> MonthlyStatus;
}

/// Parsed response body plus its raw text for pattern fallbacks.
struct Response {
    root: Element,
    raw: String,
}

/// Blocking HTTP client for the NPS business-site service.
pub struct RegistryClient {
    http: reqwest::blocking::Client,
    base_url: String,
    service_key: String,
    request_delay: Duration,
}

impl RegistryClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("NPS_API_KEY is not set (env, .env or nps_collector.toml)");
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            service_key: settings.api_key.clone(),
            request_delay: Duration::from_millis(settings.request_delay_ms),
        })
    }

    /// Sleep, send one GET, and check HTTP status and result code.
    fn call(&self, operation: &str, params: &[(&str, &str)]) -> Result<Response, RegistryError> {
        if !self.request_delay.is_zero() {
            thread::sleep(self.request_delay);
        }

        let url = format!("{}/{}", self.base_url, operation);
        let response = self
            .http
            .get(&url)
            .query(&[("serviceKey", self.service_key.as_str())])
            .query(params)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status(status.as_u16()));
        }

        let raw = response.text()?;
        let root = xml::parse(&raw)?;

        let code = root.find_text(&["resultCode"]).unwrap_or_default().trim();
        if code != SUCCESS_CODE {
            return Err(RegistryError::ResultCode {
                code: code.to_string(),
                message: root
                    .find_text(&["resultMsg"])
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            });
        }

        Ok(Response { root, raw })
    }
}

impl Registry for RegistryClient {
    fn fetch_base_info_page(
        &self,
        prefix: &str,
        year_month: &str,
        page_no: u32,
        page_size: usize,
    ) -> BasePage {
        let page_size_param = page_size.to_string();
        let page_no_param = page_no.to_string();
        let params = [
            ("bzowr_rgst_no", prefix),
            ("data_crt_ym", year_month),
            ("numOfRows", page_size_param.as_str()),
            ("pageNo", page_no_param.as_str()),
        ];

        match self.call(BASE_INFO_OP, &params) {
            Ok(resp) => {
                let sites: Vec<CandidateSite> = resp
                    .root
                    .find_all("item")
                    .into_iter()
                    .map(CandidateSite::from_item)
                    .collect();
                debug!("base info {} page {}: {} sites", prefix, page_no, sites.len());
                BasePage::new(sites, page_size)
            }
            Err(e) => {
                warn!("Base info search failed for {} page {}: {}", prefix, page_no, e);
                BasePage::default()
            }
        }
    }

    fn fetch_detail_info(&self, seq: &str, year_month: &str) -> String {
        let params = [("seq", seq), ("data_crt_ym", year_month)];
        match self.call(DETAIL_INFO_OP, &params) {
            Ok(resp) => lookup::first_non_empty(lookup::HEADCOUNT, &resp.root, &resp.raw),
            Err(e) => {
                warn!("Detail info failed for seq {}: {}", seq, e);
                String::new()
            }
        }
    }

    fn fetch_monthly_status(&self, seq: &str, year_month: &str) -> MonthlyStatus {
        let params = [("seq", seq), ("data_crt_ym", year_month)];
        let resp = match self.call(MONTHLY_STATUS_OP, &params) {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Monthly status failed for seq {}: {}", seq, e);
                return MonthlyStatus::default();
            }
        };

        let total = resp.root.find_text(&["totalCount"]).unwrap_or("0").trim();
        match total.parse::<u64>() {
            Ok(0) => return MonthlyStatus::default(),
            Ok(_) => {}
            Err(_) => {
                warn!("Monthly status for seq {} has invalid totalCount '{}'", seq, total);
                return MonthlyStatus::default();
            }
        }

        MonthlyStatus {
            new_hires: lookup::first_non_empty(lookup::NEW_HIRES, &resp.root, &resp.raw),
            separations: lookup::first_non_empty(lookup::SEPARATIONS, &resp.root, &resp.raw),
        }
    }
}
