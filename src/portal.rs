//! ICBC portal adapter: browser-driven login and availability scrape.
//!
//! Drives a chromedriver-backed browser session through `thirtyfour` and
//! normalizes what it finds into an [`AppointmentSnapshot`], so the poll
//! loop never inspects raw page content. Each `fetch` acquires a fresh
//! browser session and closes it on every exit path.
//!
//! The selectors mirror the portal's Angular Material markup and are brittle
//! by nature; structural mismatches surface as [`AdapterError::Parse`].

use crate::config::CheckerConfig;
use crate::error::AdapterError;
use crate::snapshot::AppointmentSnapshot;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thirtyfour::prelude::*;
use thirtyfour::{ChromeCapabilities, ChromiumLikeCapabilities};
use tokio::process::{Child, Command};

const LOGIN_URL: &str = "https://onlinebusiness.icbc.com/webdeas-ui/login;type=driver";
const WAIT_TIMEOUT: Duration = Duration::from_secs(20);
const WAIT_POLL: Duration = Duration::from_millis(500);

// Exact paths into the booking search modal, taken from the portal's DOM.
const BY_OFFICE_TAB_XPATH: &str = "/html/body/div/div/div/mat-dialog-container/app-search-modal/div/div/form/div[1]/mat-tab-group/mat-tab-header/div[2]/div/div/div[2]";
const LOCATION_INPUT_XPATH: &str = "/html/body/div/div[1]/div/mat-dialog-container/app-search-modal/div/div/form/div[1]/mat-tab-group/div/mat-tab-body[2]/div/div/mat-form-field/div/div[1]/div[3]/input";
const LOCATION_OPTION_XPATH: &str = "/html/body/div/div[2]/div/div/mat-option/span";
const RESULTS_XPATH: &str =
    "/html/body/div/div[2]/div/mat-dialog-container/app-eligible-tests/div/div[2]";

/// Seam between the poll loop and the portal scrape.
#[async_trait]
pub trait AppointmentSource {
    async fn fetch(&self) -> Result<AppointmentSnapshot, AdapterError>;
}

/// Scrapes availability for one test center through a WebDriver endpoint.
pub struct IcbcPortal {
    webdriver_url: String,
    last_name: String,
    license_number: String,
    keyword: String,
    location: String,
    headless: bool,
}

impl IcbcPortal {
    pub fn new(webdriver_url: impl Into<String>, config: &CheckerConfig) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            last_name: config.last_name.clone(),
            license_number: config.license_number.clone(),
            keyword: config.keyword.clone(),
            location: config.location.clone(),
            headless: config.headless,
        }
    }

    fn capabilities(&self) -> Result<ChromeCapabilities, AdapterError> {
        let mut caps = DesiredCapabilities::chrome();
        if self.headless {
            caps.add_arg("--headless=new")?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--window-size=1920,1080")?;
        caps.add_arg("--disable-extensions")?;
        caps.add_arg("--disable-notifications")?;
        Ok(caps)
    }

    async fn login(&self, driver: &WebDriver) -> Result<(), AdapterError> {
        driver.goto(LOGIN_URL).await?;
        tracing::debug!("navigated to login page");

        for (field_id, value) in [
            ("mat-input-0", &self.last_name),
            ("mat-input-1", &self.license_number),
            ("mat-input-2", &self.keyword),
        ] {
            let field = driver
                .query(By::Id(field_id))
                .wait(WAIT_TIMEOUT, WAIT_POLL)
                .first()
                .await
                .map_err(|e| AdapterError::Login(format!("login field {field_id}: {e}")))?;
            field.send_keys(value).await?;
        }

        driver
            .query(By::ClassName("mat-checkbox-inner-container"))
            .wait(WAIT_TIMEOUT, WAIT_POLL)
            .first()
            .await
            .map_err(|e| AdapterError::Login(format!("terms checkbox: {e}")))?
            .click()
            .await?;

        driver
            .query(By::XPath("//button[contains(text(), 'Sign in')]"))
            .wait(WAIT_TIMEOUT, WAIT_POLL)
            .first()
            .await
            .map_err(|e| AdapterError::Login(format!("sign-in button: {e}")))?
            .click()
            .await?;

        wait_for_url_contains(driver, "/booking", WAIT_TIMEOUT).await?;
        tracing::info!("logged in to booking portal");
        Ok(())
    }

    /// Walk the search modal to the configured center and read the result
    /// panel.
    async fn read_availability(
        &self,
        driver: &WebDriver,
    ) -> Result<AppointmentSnapshot, AdapterError> {
        driver
            .query(By::XPath(BY_OFFICE_TAB_XPATH))
            .wait(WAIT_TIMEOUT, WAIT_POLL)
            .first()
            .await
            .map_err(|e| AdapterError::Parse(format!("'By office' tab: {e}")))?
            .click()
            .await?;

        let location_input = driver
            .query(By::XPath(LOCATION_INPUT_XPATH))
            .wait(WAIT_TIMEOUT, WAIT_POLL)
            .first()
            .await
            .map_err(|e| AdapterError::Parse(format!("location input: {e}")))?;
        location_input.click().await?;
        location_input.send_keys(&self.location).await?;
        tracing::debug!(location = %self.location, "entered search location");

        // Give the autocomplete dropdown a moment to populate.
        tokio::time::sleep(Duration::from_secs(1)).await;

        driver
            .query(By::XPath(LOCATION_OPTION_XPATH))
            .wait(WAIT_TIMEOUT, WAIT_POLL)
            .first()
            .await
            .map_err(|e| AdapterError::Parse(format!("location option: {e}")))?
            .click()
            .await?;

        let results = driver
            .query(By::XPath(RESULTS_XPATH))
            .wait(WAIT_TIMEOUT, WAIT_POLL)
            .first()
            .await
            .map_err(|e| AdapterError::Parse(format!("results panel: {e}")))?;

        let no_appointments = results
            .find_all(By::XPath(
                ".//p[contains(text(), 'no appointment') or contains(text(), 'No appointment')]",
            ))
            .await?;
        if !no_appointments.is_empty() {
            tracing::info!("portal reports no appointments available");
            return Ok(AppointmentSnapshot::from_slots(vec![]));
        }

        let mut slots = Vec::new();
        for time_slot in results
            .find_all(By::XPath(".//div[contains(@class, 'appointment-time')]"))
            .await?
        {
            let date = time_slot
                .find(By::XPath(
                    "./preceding::div[contains(@class, 'appointment-date')][1]",
                ))
                .await;
            match date {
                Ok(date) => {
                    let slot = format_slot(&date.text().await?, &time_slot.text().await?);
                    tracing::info!(slot = %slot, "found appointment");
                    slots.push(slot);
                }
                Err(e) => {
                    tracing::warn!("failed to pair a time slot with its date: {e}");
                }
            }
        }

        Ok(AppointmentSnapshot::from_slots(slots))
    }
}

#[async_trait]
impl AppointmentSource for IcbcPortal {
    async fn fetch(&self) -> Result<AppointmentSnapshot, AdapterError> {
        let caps = self.capabilities()?;
        let driver = WebDriver::new(&self.webdriver_url, caps).await?;

        let result = match self.login(&driver).await {
            Ok(()) => self.read_availability(&driver).await,
            Err(e) => Err(e),
        };

        // The session must close on every exit path, including errors above.
        if let Err(quit_err) = driver.quit().await {
            tracing::warn!("failed to close browser session: {quit_err}");
        }

        result
    }
}

async fn wait_for_url_contains(
    driver: &WebDriver,
    fragment: &str,
    timeout: Duration,
) -> Result<(), AdapterError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if driver.current_url().await?.as_str().contains(fragment) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AdapterError::Login(format!(
                "sign-in did not reach a URL containing {fragment:?}"
            )));
        }
        tokio::time::sleep(WAIT_POLL).await;
    }
}

fn format_slot(date: &str, time: &str) -> String {
    format!("{} at {}", date.trim(), time.trim())
}

/// The WebDriver endpoint the portal talks to: either an externally managed
/// server, or a chromedriver child process owned by the checker and killed
/// on shutdown. Browser diagnostics go to chromedriver's own log file,
/// separate from the application log.
pub enum PortalDriver {
    External { url: String },
    Managed { child: Child, url: String },
}

impl PortalDriver {
    pub fn external(url: impl Into<String>) -> Self {
        PortalDriver::External { url: url.into() }
    }

    /// Spawn chromedriver on the given port and wait until its status
    /// endpoint answers.
    pub async fn spawn(port: u16, log_path: &str) -> Result<Self, AdapterError> {
        let child = Command::new("chromedriver")
            .arg(format!("--port={port}"))
            .arg(format!("--log-path={log_path}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // The child must never outlive the checker, even on an error
            // path that skips the explicit shutdown.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdapterError::Driver(format!("failed to start chromedriver: {e}")))?;
        let url = format!("http://localhost:{port}");

        wait_until_ready(&url).await?;
        tracing::info!(%url, "chromedriver started");
        Ok(PortalDriver::Managed { child, url })
    }

    pub fn url(&self) -> &str {
        match self {
            PortalDriver::External { url } | PortalDriver::Managed { url, .. } => url,
        }
    }

    pub async fn shutdown(self) {
        if let PortalDriver::Managed { mut child, .. } = self {
            if let Err(e) = child.kill().await {
                tracing::warn!("failed to stop chromedriver: {e}");
            } else {
                tracing::info!("chromedriver stopped");
            }
        }
    }
}

async fn wait_until_ready(url: &str) -> Result<(), AdapterError> {
    let client = reqwest::Client::new();
    for _ in 0..20 {
        let ready = client
            .get(format!("{url}/status"))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success());
        if ready {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Err(AdapterError::Driver(format!(
        "chromedriver did not become ready at {url}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_formatting_trims_scraped_whitespace() {
        assert_eq!(
            format_slot(" Friday, May 10 \n", " 10:15 AM "),
            "Friday, May 10 at 10:15 AM"
        );
    }

    #[test]
    fn driver_url_is_shared_across_variants() {
        let driver = PortalDriver::external("http://localhost:9515");
        assert_eq!(driver.url(), "http://localhost:9515");
    }
}
