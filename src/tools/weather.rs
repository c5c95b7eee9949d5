//! Weather lookup tool.
//!
//! Input format: `"<城市>,<date>"` with `date` one of
//! `today | tomorrow | after_tomorrow`. Output is free text in the upstream
//! page's phrasing, e.g. `"北京今天天气：晴，温度18~25℃，西北风<3级"`. The
//! router pattern-extracts temperature/condition/wind from that text.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use super::Tool;
use crate::config::WeatherConfig;
use crate::errors::ApiError;

/// Supported cities and their weather.com.cn page codes.
pub const CITY_CODES: &[(&str, &str)] = &[
    ("北京", "101010100"),
    ("上海", "101020100"),
    ("广州", "101280101"),
    ("深圳", "101280601"),
    ("杭州", "101210101"),
    ("成都", "101270101"),
    ("重庆", "101040100"),
    ("武汉", "101200101"),
    ("南京", "101190101"),
    ("西安", "101110101"),
    ("苏州", "101190401"),
    ("天津", "101030100"),
    ("长沙", "101250101"),
    ("青岛", "101120201"),
    ("大连", "101070201"),
    ("宁波", "101210401"),
    ("厦门", "101230201"),
    ("郑州", "101180101"),
    ("济南", "101120101"),
];

const VALID_DATES: &[&str] = &["today", "tomorrow", "after_tomorrow"];

/// Fixture data served when no upstream is configured. Kept in the same
/// phrasing the scraper produces so downstream parsing behaves identically.
const MOCK_WEATHER: &[(&str, [&str; 3])] = &[
    ("北京", ["晴，温度18~25℃，西北风<3级", "多云，温度16~22℃，北风<3级", "晴，温度17~24℃，南风<3级"]),
    ("上海", ["阴，温度15~20℃，东风<4级", "小雨，温度14~19℃，东南风<4级", "阴，温度15~21℃，东风<3级"]),
    ("广州", ["晴，温度24~30℃，南风<3级", "晴，温度25~31℃，南风<3级", "多云，温度24~29℃，微风<3级"]),
    ("深圳", ["多云，温度23~28℃，南风<3级", "阵雨，温度22~26℃，东南风<4级", "多云，温度23~27℃，微风<3级"]),
    ("杭州", ["小雨，温度13~19℃，北风<4级", "阴，温度14~21℃，北风<3级", "多云，温度15~22℃，微风<3级"]),
    ("成都", ["多云，温度16~22℃，微风<3级", "晴，温度17~24℃，微风<3级", "多云，温度16~23℃，微风<3级"]),
];

pub struct WeatherTool {
    config: WeatherConfig,
    client: Client,
}

impl WeatherTool {
    pub fn new(config: WeatherConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self { config, client })
    }

    fn mock_weather(location: &str, date: &str) -> String {
        let day_index = day_index(date);
        match MOCK_WEATHER.iter().find(|(city, _)| *city == location) {
            Some((_, days)) => format!(
                "{}{}天气：{}",
                location,
                date_label(date),
                days[day_index]
            ),
            None => format!("{}{}天气：未知，数据暂缺", location, date_label(date)),
        }
    }

    async fn fetch_weather_cn(&self, location: &str, code: &str, date: &str) -> Result<String, ApiError> {
        let url = format!("http://www.weather.com.cn/weather/{}.shtml", code);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", "Mozilla/5.0")
            .send()
            .await
            .map_err(|e| ApiError::Tool(format!("请求天气数据失败: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Tool(format!(
                "获取天气数据失败，HTTP状态码: {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ApiError::Tool(format!("读取天气数据失败: {}", e)))?;

        parse_weather_cn_page(&html, day_index(date))
            .map(|day| format!("{}{}天气：{}", location, date_label(date), day))
            .ok_or_else(|| ApiError::Tool("解析天气数据失败：找不到天气信息".to_string()))
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    async fn invoke(&self, input: &str) -> Result<String, ApiError> {
        let Some((location, date)) = input.split_once(',') else {
            return Ok("参数错误：请提供正确的查询格式，如'北京,today'".to_string());
        };
        let location = location.trim();
        let date = date.trim().to_lowercase();

        if location.is_empty() {
            return Ok("参数错误：地点不能为空".to_string());
        }
        if !VALID_DATES.contains(&date.as_str()) {
            return Ok(format!(
                "参数错误：日期必须是 {} 之一",
                VALID_DATES.join("/")
            ));
        }

        let Some((_, code)) = CITY_CODES.iter().find(|(city, _)| *city == location) else {
            let mut cities: Vec<&str> = CITY_CODES.iter().map(|(city, _)| *city).collect();
            cities.sort_unstable();
            return Ok(format!(
                "暂不支持查询该地区，当前支持的城市: {}",
                cities.join(", ")
            ));
        };

        tracing::info!("weather lookup: location={}, date={}", location, date);

        if self.config.source == "mock" {
            return Ok(Self::mock_weather(location, &date));
        }

        self.fetch_weather_cn(location, code, &date).await
    }
}

fn day_index(date: &str) -> usize {
    match date {
        "tomorrow" => 1,
        "after_tomorrow" => 2,
        _ => 0,
    }
}

fn date_label(date: &str) -> &'static str {
    match date {
        "tomorrow" => "明天",
        "after_tomorrow" => "后天",
        _ => "今天",
    }
}

/// Pull the nth day's condition/temperature/wind out of the forecast page.
///
/// The page is unstructured HTML; this extraction is best-effort and returns
/// `None` when the layout changes underneath us.
fn parse_weather_cn_page(html: &str, day: usize) -> Option<String> {
    let condition_re = Regex::new(r#"<p[^>]*class="wea"[^>]*>([^<]+)</p>"#).ok()?;
    let temp_re = Regex::new(
        r#"<p[^>]*class="tem"[^>]*>\s*(?:<span>(-?\d+)[^<]*</span>)?[^<]*<i>(-?\d+)[^<]*</i>"#,
    )
    .ok()?;
    let wind_re = Regex::new(r#"<p[^>]*class="win"[^>]*>[\s\S]*?<i>([^<]+)</i>"#).ok()?;

    let condition = condition_re.captures_iter(html).nth(day)?;
    let temps = temp_re.captures_iter(html).nth(day)?;
    let wind = wind_re.captures_iter(html).nth(day)?;

    let condition = condition.get(1)?.as_str().trim();
    let low = temps.get(2)?.as_str();
    let temp = match temps.get(1) {
        Some(high) => format!("{}~{}℃", low, high.as_str()),
        None => format!("{}℃", low),
    };
    let wind = decode_entities(wind.get(1)?.as_str().trim());

    Some(format!("{}，温度{}，{}", condition, temp, wind))
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
