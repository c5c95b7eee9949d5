//! Per-query routing.
//!
//! Decides which strategy answers a query: supplied RAG context wins
//! outright, then the model's own classification signal, then keyword
//! fallbacks for knowledge-base and weather intents, and finally the plain
//! completion. The keyword passes back up the model-side classification,
//! which on its own misses intents it was never trained to emit.

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use regex::Regex;
use serde_json::Value;

use crate::errors::ApiError;
use crate::llm::{LlmService, PromptMode};
use crate::llm::types::ChatMessage;
use crate::tools::{ToolRegistry, CITY_CODES};

const NEED_RAG_MESSAGE: &str =
    "这个问题可能需要查询知识库获取准确信息，请先上传简历后在知识库问答模式下提问。";

const EXPERIENCE_KEYWORDS: &[&str] = &[
    "经历", "经验", "项目", "工作", "职业", "技能", "能力", "学习", "教育",
    "做过", "参与", "负责", "开发", "设计", "实现", "完成", "成果",
];

const WEATHER_KEYWORDS: &[&str] = &[
    "天气", "气温", "温度", "下雨", "下雪", "热", "冷", "出门", "宅家", "防晒", "保暖",
];

const WEATHER_CONDITIONS: &[&str] = &["晴", "阴", "多云", "雨", "雪"];

/// The router's decision about which strategy answers a query.
#[derive(Debug, Clone)]
pub enum Classification {
    PlainAnswer(String),
    ToolRequest { tool: String, params: Value },
    NeedsRag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    General,
    Rag,
    Tool,
}

#[derive(Debug, Clone)]
pub struct RouterReply {
    pub text: String,
    pub kind: ReplyKind,
}

#[derive(Clone)]
pub struct QueryRouter {
    llm: LlmService,
    tools: Arc<ToolRegistry>,
}

impl QueryRouter {
    pub fn new(llm: LlmService, tools: Arc<ToolRegistry>) -> Self {
        Self { llm, tools }
    }

    pub async fn route(
        &self,
        query: &str,
        history: &[ChatMessage],
        rag_context: Option<&str>,
    ) -> Result<RouterReply, ApiError> {
        // Retrieved context always wins: once retrieval found material,
        // intent classification is skipped entirely.
        if let Some(context) = rag_context {
            let text = self
                .llm
                .generate(PromptMode::Rag, query, history, Some(context))
                .await?;
            return Ok(RouterReply {
                text,
                kind: ReplyKind::Rag,
            });
        }

        match self.classify(query, history).await? {
            Classification::PlainAnswer(text) => Ok(RouterReply {
                text,
                kind: ReplyKind::General,
            }),
            Classification::NeedsRag(message) => Ok(RouterReply {
                text: message,
                kind: ReplyKind::General,
            }),
            Classification::ToolRequest { tool, params } => {
                self.dispatch(query, history, &tool, params).await
            }
        }
    }

    async fn classify(
        &self,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Classification, ApiError> {
        let response = self
            .llm
            .generate(PromptMode::General, query, history, None)
            .await?;

        if let Some(signal) = parse_model_signal(&response) {
            tracing::info!("model classification signal accepted");
            return Ok(signal);
        }

        if EXPERIENCE_KEYWORDS.iter().any(|kw| query.contains(kw)) {
            return Ok(Classification::NeedsRag(NEED_RAG_MESSAGE.to_string()));
        }

        if WEATHER_KEYWORDS.iter().any(|kw| query.contains(kw)) {
            return Ok(match extract_weather_params(query) {
                Some(params) => Classification::ToolRequest {
                    tool: "get_weather".to_string(),
                    params,
                },
                None => Classification::PlainAnswer("无法解析天气查询参数".to_string()),
            });
        }

        Ok(Classification::PlainAnswer(response))
    }

    async fn dispatch(
        &self,
        query: &str,
        history: &[ChatMessage],
        tool: &str,
        params: Value,
    ) -> Result<RouterReply, ApiError> {
        match tool {
            "get_weather" => self.handle_weather(query, history, params).await,
            other => Ok(RouterReply {
                text: format!("暂不支持的工具: {}", other),
                kind: ReplyKind::Tool,
            }),
        }
    }

    async fn handle_weather(
        &self,
        query: &str,
        history: &[ChatMessage],
        params: Value,
    ) -> Result<RouterReply, ApiError> {
        let location = params
            .get("location")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| find_supported_city(query));

        let Some(location) = location else {
            return Ok(RouterReply {
                text: "无法解析天气查询参数".to_string(),
                kind: ReplyKind::Tool,
            });
        };

        let date = params
            .get("date")
            .and_then(|v| v.as_str())
            .filter(|d| matches!(*d, "today" | "tomorrow" | "after_tomorrow"))
            .map(str::to_string)
            .unwrap_or_else(|| relative_date_token(query));

        let Some(tool) = self.tools.find("get_weather") else {
            return Ok(RouterReply {
                text: "天气查询服务不可用".to_string(),
                kind: ReplyKind::Tool,
            });
        };

        let report_text = match tool.invoke(&format!("{},{}", location, date)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("weather tool failed: {}", e);
                return Ok(RouterReply {
                    text: format!("天气查询失败: {}", e),
                    kind: ReplyKind::Tool,
                });
            }
        };

        let report = parse_weather_report(&report_text);

        // Nothing extractable means the tool answered outside its normal
        // phrasing (parameter message, unsupported city, upstream change).
        // Hand the raw output to the model instead of showing "未知" fields.
        if report.temp == "未知" && report.condition == "未知" {
            tracing::warn!("weather report did not parse; summarizing raw tool output");
            let prompt = format!(
                "你刚刚调用了工具 'get_weather'，得到结果如下：\n---\n{}\n---\n现在请根据这个结果回答用户最初的问题：'{}'",
                report_text, query
            );
            let text = self
                .llm
                .generate(PromptMode::ToolResult, &prompt, history, None)
                .await?;
            return Ok(RouterReply {
                text,
                kind: ReplyKind::Tool,
            });
        }

        // A failed tip degrades to no tip; the forecast itself still answers.
        let tip = match self
            .llm
            .generate(PromptMode::WeatherTip, &tip_prompt(&location, &report), &[], None)
            .await
        {
            Ok(tip) if !tip.trim().is_empty() => Some(tip),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("weather tip generation failed: {}", e);
                None
            }
        };

        let text = compose_weather_reply(
            &location,
            &date,
            &report,
            tip.as_deref(),
            Local::now().date_naive(),
        );
        Ok(RouterReply {
            text,
            kind: ReplyKind::Tool,
        })
    }
}

/// Parse a model completion as a classification signal.
///
/// The general prompt asks for a bare JSON object with a `function` field;
/// anything that does not parse that way is an ordinary answer.
fn parse_model_signal(response: &str) -> Option<Classification> {
    let value: Value = serde_json::from_str(response.trim()).ok()?;
    match value.get("function")?.as_str()? {
        "get_weather" => Some(Classification::ToolRequest {
            tool: "get_weather".to_string(),
            params: value.get("data").cloned().unwrap_or(Value::Null),
        }),
        "need_rag" => Some(Classification::NeedsRag(NEED_RAG_MESSAGE.to_string())),
        _ => None,
    }
}

fn find_supported_city(query: &str) -> Option<String> {
    CITY_CODES
        .iter()
        .find(|(city, _)| query.contains(city))
        .map(|(city, _)| city.to_string())
}

fn relative_date_token(query: &str) -> String {
    if query.contains("明天") {
        "tomorrow".to_string()
    } else if query.contains("后天") {
        "after_tomorrow".to_string()
    } else {
        "today".to_string()
    }
}

fn extract_weather_params(query: &str) -> Option<Value> {
    let location = find_supported_city(query)?;
    Some(serde_json::json!({
        "location": location,
        "date": relative_date_token(query),
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherReport {
    pub temp: String,
    pub condition: String,
    pub wind: String,
}

/// Pattern-extract temperature/condition/wind from the tool's free text.
///
/// The tool output is unstructured, so this is best-effort by contract;
/// unrecognized fields come back as "未知" rather than failing the query.
fn parse_weather_report(text: &str) -> WeatherReport {
    let range = Regex::new(r"温度(-?\d+)~(-?\d+)℃").ok();
    let single = Regex::new(r"温度(-?\d+)℃").ok();
    let wind_re = Regex::new(r"<(\d+)级").ok();

    let temp = range
        .and_then(|re| {
            re.captures(text)
                .map(|c| format!("{}~{}", &c[1], &c[2]))
        })
        .or_else(|| {
            single.and_then(|re| re.captures(text).map(|c| c[1].to_string()))
        })
        .unwrap_or_else(|| "未知".to_string());

    let condition = WEATHER_CONDITIONS
        .iter()
        .find(|w| text.contains(*w))
        .map(|w| w.to_string())
        .unwrap_or_else(|| "未知".to_string());

    let wind = wind_re
        .and_then(|re| re.captures(text).map(|c| c[1].to_string()))
        .unwrap_or_else(|| "未知".to_string());

    WeatherReport {
        temp,
        condition,
        wind,
    }
}

fn tip_prompt(location: &str, report: &WeatherReport) -> String {
    format!(
        "根据{}的天气状况（{}，气温{}℃，风力{}级），给出一句温馨提示。要简短自然，不要重复天气相关信息，可以用emoji表情显得更加亲切。",
        location, report.condition, report.temp, report.wind
    )
}

fn compose_weather_reply(
    location: &str,
    date: &str,
    report: &WeatherReport,
    tip: Option<&str>,
    today: NaiveDate,
) -> String {
    let (label, day) = match date {
        "tomorrow" => ("明天", today + Duration::days(1)),
        "after_tomorrow" => ("后天", today + Duration::days(2)),
        _ => ("今天", today),
    };

    let mut text = format!(
        "{}是{}，{}天气{}，气温{}℃，风力{}级。",
        label,
        day.format("%Y年%m月%d日"),
        location,
        report.condition,
        report.temp,
        report.wind
    );
    if let Some(tip) = tip {
        text.push_str("\n\n温馨提示：");
        text.push_str(tip);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmConfig, WeatherConfig};
    use crate::testing::FakeLlmProvider;
    use crate::tools::WeatherTool;

    fn router_with(provider: Arc<FakeLlmProvider>) -> QueryRouter {
        let llm = LlmService::new(provider, LlmConfig::default());
        let tools = Arc::new(
            ToolRegistry::new()
                .register(Arc::new(WeatherTool::new(WeatherConfig::default()).unwrap())),
        );
        QueryRouter::new(llm, tools)
    }

    #[tokio::test]
    async fn rag_context_takes_precedence_over_classification() {
        let provider = Arc::new(FakeLlmProvider::with_replies(["根据资料，我参与了问答系统项目"]));
        let router = router_with(provider.clone());

        let reply = router
            .route("做过什么项目", &[], Some("问答系统：负责检索模块"))
            .await
            .unwrap();

        assert_eq!(reply.kind, ReplyKind::Rag);
        assert!(reply.text.contains("问答系统"));

        // Exactly one completion, decoded near-deterministically.
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(0.1));
    }

    #[tokio::test]
    async fn weather_keywords_dispatch_the_tool() {
        let provider = Arc::new(FakeLlmProvider::with_replies([
            "好的，我来帮你查询",      // general classification turn
            "出门记得防晒哦🌞",        // weather tip turn
        ]));
        let router = router_with(provider);

        let reply = router.route("北京今天天气怎么样", &[], None).await.unwrap();

        assert_eq!(reply.kind, ReplyKind::Tool);
        assert!(reply.text.contains("北京"));
        assert!(reply.text.contains("气温18~25℃"));
        assert!(reply.text.contains("温馨提示"));
    }

    #[tokio::test]
    async fn model_signal_routes_without_keywords() {
        let provider = Arc::new(FakeLlmProvider::with_replies([
            r#"{"function": "get_weather", "data": {"location": "成都", "date": "tomorrow"}}"#,
            "记得带伞☔",
        ]));
        let router = router_with(provider);

        // No weather keyword in the query; the signal alone drives routing.
        let reply = router.route("成都明儿个怎么样", &[], None).await.unwrap();

        assert_eq!(reply.kind, ReplyKind::Tool);
        assert!(reply.text.contains("成都"));
        assert!(reply.text.contains("明天"));
    }

    #[tokio::test]
    async fn unparseable_tool_output_falls_back_to_summarization() {
        let provider = Arc::new(FakeLlmProvider::with_replies([
            r#"{"function": "get_weather", "data": {"location": "纽约", "date": "today"}}"#,
            "目前还不支持纽约的天气查询哦，可以试试北京、上海这些城市",
        ]));
        let router = router_with(provider);

        let reply = router.route("纽约天气怎么样", &[], None).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::Tool);
        assert!(reply.text.contains("不支持纽约"));
    }

    #[tokio::test]
    async fn need_rag_signal_is_an_advisory_answer() {
        let provider = Arc::new(FakeLlmProvider::with_replies([r#"{"function": "need_rag"}"#]));
        let router = router_with(provider);

        let reply = router.route("介绍一下你的论文", &[], None).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::General);
        assert!(reply.text.contains("知识库"));
    }

    #[tokio::test]
    async fn experience_keywords_fall_back_to_need_rag() {
        let provider = Arc::new(FakeLlmProvider::with_replies(["我不太确定"]));
        let router = router_with(provider);

        let reply = router.route("你做过什么项目", &[], None).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::General);
        assert_eq!(reply.text, NEED_RAG_MESSAGE);
    }

    #[tokio::test]
    async fn plain_questions_pass_the_completion_through() {
        let provider = Arc::new(FakeLlmProvider::with_replies(["哈哈，好的"]));
        let router = router_with(provider);

        let reply = router.route("给我讲个笑话", &[], None).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::General);
        assert_eq!(reply.text, "哈哈，好的");
    }

    #[tokio::test]
    async fn weather_query_without_supported_city_degrades() {
        let provider = Arc::new(FakeLlmProvider::with_replies(["我查一下"]));
        let router = router_with(provider);

        let reply = router.route("拉萨今天天气如何", &[], None).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::General);
        assert_eq!(reply.text, "无法解析天气查询参数");
    }

    #[test]
    fn weather_report_extraction() {
        let report = parse_weather_report("北京今天天气：晴，温度18~25℃，西北风<3级");
        assert_eq!(report.temp, "18~25");
        assert_eq!(report.condition, "晴");
        assert_eq!(report.wind, "3");

        let single = parse_weather_report("上海今天天气：小雨，温度9℃，东风<4级");
        assert_eq!(single.temp, "9");
        assert_eq!(single.condition, "雨");

        let degraded = parse_weather_report("数据暂缺");
        assert_eq!(degraded.temp, "未知");
        assert_eq!(degraded.condition, "未知");
        assert_eq!(degraded.wind, "未知");
    }

    #[test]
    fn model_signal_parsing() {
        assert!(parse_model_signal("今天天气不错").is_none());
        assert!(parse_model_signal(r#"{"other": 1}"#).is_none());

        let signal = parse_model_signal(r#"{"function": "need_rag"}"#).unwrap();
        assert!(matches!(signal, Classification::NeedsRag(_)));

        let signal =
            parse_model_signal(r#"{"function": "get_weather", "data": {"location": "北京"}}"#)
                .unwrap();
        match signal {
            Classification::ToolRequest { tool, params } => {
                assert_eq!(tool, "get_weather");
                assert_eq!(params["location"], "北京");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn date_tokens_from_query() {
        assert_eq!(relative_date_token("北京明天天气"), "tomorrow");
        assert_eq!(relative_date_token("北京后天天气"), "after_tomorrow");
        assert_eq!(relative_date_token("北京天气"), "today");
    }

    #[test]
    fn composed_reply_has_header_body_and_tip() {
        let report = WeatherReport {
            temp: "18~25".to_string(),
            condition: "晴".to_string(),
            wind: "3".to_string(),
        };
        let today = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();

        let text = compose_weather_reply("北京", "tomorrow", &report, Some("带件外套🧥"), today);
        assert!(text.starts_with("明天是2025年04月21日"));
        assert!(text.contains("北京天气晴"));
        assert!(text.contains("气温18~25℃"));
        assert!(text.contains("温馨提示：带件外套🧥"));

        let no_tip = compose_weather_reply("北京", "today", &report, None, today);
        assert!(!no_tip.contains("温馨提示"));
    }
}
