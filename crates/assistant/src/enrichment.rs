use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use viaje_core::{DestinationInfo, Photo};

use crate::generator::non_empty_env;

pub const DEFAULT_UNSPLASH_ENDPOINT: &str = "https://api.unsplash.com";
pub const DEFAULT_OPENWEATHER_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5";
pub const DEFAULT_EXCHANGE_ENDPOINT: &str = "https://api.exchangerate-api.com/v4";
pub const PHOTOS_PER_DESTINATION: usize = 3;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

const COUNTRY_CURRENCIES: &[(&str, &str)] = &[
    ("US", "USD"), ("MX", "MXN"), ("AR", "ARS"), ("CL", "CLP"), ("CO", "COP"), ("PE", "PEN"),
    ("BR", "BRL"), ("ES", "EUR"), ("FR", "EUR"), ("IT", "EUR"), ("DE", "EUR"), ("GB", "GBP"),
    ("JP", "JPY"), ("CN", "CNY"), ("IN", "INR"), ("AU", "AUD"), ("CA", "CAD"), ("CH", "CHF"),
    ("NZ", "NZD"), ("KR", "KRW"), ("TH", "THB"), ("SG", "SGD"), ("MY", "MYR"), ("ID", "IDR"),
    ("PH", "PHP"), ("VN", "VND"), ("TR", "TRY"), ("EG", "EGP"), ("ZA", "ZAR"), ("AE", "AED"),
    ("SA", "SAR"), ("IL", "ILS"), ("RU", "RUB"), ("PL", "PLN"), ("NL", "EUR"), ("BE", "EUR"),
    ("PT", "EUR"), ("GR", "EUR"), ("IE", "EUR"), ("AT", "EUR"), ("FI", "EUR"), ("SE", "SEK"),
    ("NO", "NOK"), ("DK", "DKK"), ("CZ", "CZK"), ("HU", "HUF"), ("RO", "RON"), ("BG", "BGN"),
];

/// Main currency for an ISO country code; USD when the country is not listed.
pub fn currency_for_country(country_code: &str) -> &'static str {
    COUNTRY_CURRENCIES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(country_code.trim()))
        .map(|(_, currency)| *currency)
        .unwrap_or("USD")
}

/// Photo and weather lookups each switch on when their key is set.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub unsplash_access_key: Option<String>,
    pub unsplash_endpoint: String,
    pub openweather_api_key: Option<String>,
    pub openweather_endpoint: String,
    pub exchange_endpoint: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            unsplash_access_key: None,
            unsplash_endpoint: DEFAULT_UNSPLASH_ENDPOINT.to_string(),
            openweather_api_key: None,
            openweather_endpoint: DEFAULT_OPENWEATHER_ENDPOINT.to_string(),
            exchange_endpoint: DEFAULT_EXCHANGE_ENDPOINT.to_string(),
        }
    }
}

impl EnrichmentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            unsplash_access_key: non_empty_env("VIAJE_UNSPLASH_ACCESS_KEY"),
            unsplash_endpoint: non_empty_env("VIAJE_UNSPLASH_ENDPOINT")
                .unwrap_or(defaults.unsplash_endpoint),
            openweather_api_key: non_empty_env("VIAJE_OPENWEATHER_API_KEY"),
            openweather_endpoint: non_empty_env("VIAJE_OPENWEATHER_ENDPOINT")
                .unwrap_or(defaults.openweather_endpoint),
            exchange_endpoint: non_empty_env("VIAJE_EXCHANGE_ENDPOINT")
                .unwrap_or(defaults.exchange_endpoint),
        }
    }

    fn any_enabled(&self) -> bool {
        self.unsplash_access_key.is_some() || self.openweather_api_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub country: String,
    pub temperature_c: i64,
    pub description: String,
    pub utc_offset_secs: i32,
}

impl WeatherReport {
    pub fn prompt_line(&self) -> String {
        format!("{}°C, {}", self.temperature_c, self.description)
    }
}

/// What the lookups found for one destination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub photos: Vec<Photo>,
    pub weather: Option<WeatherReport>,
    pub usd_exchange_rate: Option<f64>,
}

impl Enrichment {
    pub fn destination_info(&self, destination: String) -> DestinationInfo {
        self.destination_info_at(destination, Utc::now())
    }

    fn destination_info_at(&self, destination: String, now: DateTime<Utc>) -> DestinationInfo {
        let Some(weather) = &self.weather else {
            return DestinationInfo {
                destination,
                ..DestinationInfo::default()
            };
        };

        let local_time = FixedOffset::east_opt(weather.utc_offset_secs)
            .map(|offset| now.with_timezone(&offset).format("%H:%M").to_string());
        let utc_offset_hours = (f64::from(weather.utc_offset_secs) / 360.0).round() / 10.0;

        DestinationInfo {
            destination,
            city: Some(weather.city.clone()),
            country: Some(weather.country.clone()),
            temperature_c: Some(weather.temperature_c),
            weather: Some(weather.description.clone()),
            utc_offset_hours: Some(utc_offset_hours),
            local_time,
            currency: Some(currency_for_country(&weather.country).to_string()),
            usd_exchange_rate: self.usd_exchange_rate,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UnsplashSearch {
    #[serde(default)]
    results: Vec<UnsplashPhoto>,
}

#[derive(Debug, Deserialize)]
struct UnsplashPhoto {
    urls: UnsplashUrls,
    user: UnsplashUser,
    description: Option<String>,
    alt_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnsplashUrls {
    regular: String,
    small: String,
    full: String,
}

#[derive(Debug, Deserialize)]
struct UnsplashUser {
    name: String,
}

impl From<UnsplashPhoto> for Photo {
    fn from(photo: UnsplashPhoto) -> Self {
        Photo {
            url: photo.urls.regular,
            small_url: photo.urls.small,
            full_url: photo.urls.full,
            author: photo.user.name,
            description: photo
                .description
                .filter(|text| !text.trim().is_empty())
                .or(photo.alt_description)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenWeatherCurrent {
    name: String,
    sys: OpenWeatherSys,
    main: OpenWeatherMain,
    #[serde(default)]
    weather: Vec<OpenWeatherCondition>,
    #[serde(default)]
    timezone: i32,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherSys {
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherCondition {
    description: String,
}

impl From<OpenWeatherCurrent> for WeatherReport {
    fn from(current: OpenWeatherCurrent) -> Self {
        let description = current
            .weather
            .into_iter()
            .next()
            .map(|condition| capitalize(&condition.description))
            .unwrap_or_default();

        WeatherReport {
            city: current.name,
            country: current.sys.country,
            temperature_c: current.main.temp.round() as i64,
            description,
            utc_offset_secs: current.timezone,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeRates {
    #[serde(default)]
    rates: std::collections::HashMap<String, f64>,
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Looks up photos, current weather and the USD exchange rate for a destination.
/// Lookups never fail the caller: a missing key or an upstream error yields an
/// empty result.
#[derive(Debug, Clone)]
pub struct DestinationEnricher {
    http_client: Option<Client>,
    config: EnrichmentConfig,
}

impl Default for DestinationEnricher {
    fn default() -> Self {
        Self::disabled()
    }
}

impl DestinationEnricher {
    pub fn disabled() -> Self {
        Self {
            http_client: None,
            config: EnrichmentConfig::default(),
        }
    }

    pub fn new(config: EnrichmentConfig) -> Result<Self> {
        if !config.any_enabled() {
            return Ok(Self {
                http_client: None,
                config,
            });
        }

        let http_client = Client::builder()
            .connect_timeout(LOOKUP_TIMEOUT)
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .context("failed to build lookup HTTP client")?;

        Ok(Self {
            http_client: Some(http_client),
            config,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.http_client.is_some()
    }

    pub async fn enrich(&self, destination: &str) -> Enrichment {
        if !self.is_enabled() || destination.trim().is_empty() {
            return Enrichment::default();
        }

        let (photos, weather) = tokio::join!(self.photos(destination), self.weather(destination));
        let usd_exchange_rate = match &weather {
            Some(report) => self.usd_exchange_rate(currency_for_country(&report.country)).await,
            None => None,
        };

        Enrichment {
            photos,
            weather,
            usd_exchange_rate,
        }
    }

    pub async fn photos(&self, destination: &str) -> Vec<Photo> {
        let (Some(client), Some(access_key)) = (
            self.http_client.as_ref(),
            self.config.unsplash_access_key.as_deref(),
        ) else {
            return Vec::new();
        };

        match self.fetch_photos(client, access_key, destination).await {
            Ok(photos) => {
                debug!(destination, count = photos.len(), "destination photos found");
                photos
            }
            Err(err) => {
                warn!(error = %err, destination, "photo lookup failed");
                Vec::new()
            }
        }
    }

    pub async fn weather(&self, destination: &str) -> Option<WeatherReport> {
        let (Some(client), Some(api_key)) = (
            self.http_client.as_ref(),
            self.config.openweather_api_key.as_deref(),
        ) else {
            return None;
        };

        match self.fetch_weather(client, api_key, destination).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(error = %err, destination, "weather lookup failed");
                None
            }
        }
    }

    async fn usd_exchange_rate(&self, currency: &str) -> Option<f64> {
        let client = self.http_client.as_ref()?;

        match self.fetch_usd_rates(client).await {
            Ok(rates) => rates.rates.get(currency).copied(),
            Err(err) => {
                warn!(error = %err, currency, "exchange rate lookup failed");
                None
            }
        }
    }

    async fn fetch_photos(
        &self,
        client: &Client,
        access_key: &str,
        destination: &str,
    ) -> Result<Vec<Photo>> {
        let per_page = PHOTOS_PER_DESTINATION.to_string();
        let search: UnsplashSearch = client
            .get(endpoint_url(&self.config.unsplash_endpoint, "search/photos"))
            .header("Authorization", format!("Client-ID {access_key}"))
            .query(&[
                ("query", destination),
                ("per_page", per_page.as_str()),
                ("orientation", "landscape"),
                ("order_by", "popularity"),
            ])
            .send()
            .await
            .context("photo search request failed")?
            .error_for_status()
            .context("photo search returned an error status")?
            .json()
            .await
            .context("photo search returned an unexpected body")?;

        Ok(search
            .results
            .into_iter()
            .take(PHOTOS_PER_DESTINATION)
            .map(Photo::from)
            .collect())
    }

    async fn fetch_weather(
        &self,
        client: &Client,
        api_key: &str,
        destination: &str,
    ) -> Result<WeatherReport> {
        let current: OpenWeatherCurrent = client
            .get(endpoint_url(&self.config.openweather_endpoint, "weather"))
            .query(&[
                ("q", destination),
                ("appid", api_key),
                ("units", "metric"),
                ("lang", "es"),
            ])
            .send()
            .await
            .context("weather request failed")?
            .error_for_status()
            .context("weather lookup returned an error status")?
            .json()
            .await
            .context("weather lookup returned an unexpected body")?;

        Ok(current.into())
    }

    async fn fetch_usd_rates(&self, client: &Client) -> Result<ExchangeRates> {
        client
            .get(endpoint_url(&self.config.exchange_endpoint, "latest/USD"))
            .send()
            .await
            .context("exchange rate request failed")?
            .error_for_status()
            .context("exchange rate lookup returned an error status")?
            .json()
            .await
            .context("exchange rate lookup returned an unexpected body")
    }
}

fn endpoint_url(endpoint: &str, path: &str) -> String {
    format!("{}/{path}", endpoint.trim_end_matches('/'))
}
