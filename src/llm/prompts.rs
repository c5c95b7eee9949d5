//! Prompt assembly for each generation mode.
//!
//! A prompt is a system turn, the windowed conversation history in
//! chronological order, then the current user turn. RAG mode wraps the
//! retrieved context into the user turn between explicit delimiters so the
//! model cannot confuse reference material with the question.

use super::types::{ChatMessage, PromptMode};

const GENERAL_SYSTEM_PROMPT: &str = "你是一个有用的中文助手，能够回答各种问题并提供天气查询等功能。\n对于用户的问题，你需要判断：\n1. 如果是天气相关查询，请只输出一个JSON对象：{\"function\": \"get_weather\", \"data\": {\"location\": \"城市名\", \"date\": \"today|tomorrow|after_tomorrow\"}}\n2. 如果是关于个人经历、工作经验、项目经验等问题，请只输出一个JSON对象：{\"function\": \"need_rag\"}\n3. 对于其他一般性问题，你可以直接用自然语言回答";

const RAG_SYSTEM_PROMPT: &str = "**你必须严格遵守以下规则：**\n1. 你必须根据获取到的资料信息来回答我的问题，绝不能乱编造，尽量详尽，可以自己扩充但不能有虚假信息。\n2. 你的回答应该具体，比如当我问到做过什么项目时，不能只回答“参与了项目A”，而是应该说明在项目A中负责的模块和使用的技术。\n3. 如果我询问任何与“工作”有关的问题，都需要从资料中的项目和技术栈出发进行阐述，不能胡编乱造。\n4. 可以直接引用资料原文，可以使用emoji表情进行回复。\n5. 请务必使用markdown格式进行输出。";

const WEATHER_TIP_SYSTEM_PROMPT: &str = "你是一个友好的天气助手。请根据提供的天气状况，生成一句温馨提示。要求：\n1. 简短自然，不超过20字，契合天气状况：15度以下提示保暖，15~25度提示增减衣物，25度以上提示防晒，30度以上提示多喝水、少户外活动。\n2. 使用emoji表情让提示更亲切。\n3. 不要重复已知的天气信息。";

const TOOL_RESULT_SYSTEM_PROMPT: &str = "你是一个有用的中文助手。你会收到一段工具调用的结果，请根据这个结果回答用户最初的问题，不要编造结果之外的信息。";

pub fn system_prompt(mode: PromptMode) -> &'static str {
    match mode {
        PromptMode::General => GENERAL_SYSTEM_PROMPT,
        PromptMode::Rag => RAG_SYSTEM_PROMPT,
        PromptMode::WeatherTip => WEATHER_TIP_SYSTEM_PROMPT,
        PromptMode::ToolResult => TOOL_RESULT_SYSTEM_PROMPT,
    }
}

/// Assemble the full message list for a completion request.
///
/// `history` is the caller's window, oldest first. Turns with roles other
/// than user/assistant and empty turns are dropped rather than forwarded.
pub fn assemble(
    mode: PromptMode,
    query: &str,
    history: &[ChatMessage],
    context: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(mode)));

    for msg in history {
        if msg.content.trim().is_empty() {
            continue;
        }
        match msg.role.as_str() {
            "user" => messages.push(ChatMessage::user(msg.content.clone())),
            "assistant" => messages.push(ChatMessage::assistant(msg.content.clone())),
            _ => {}
        }
    }

    let user_turn = match (mode, context) {
        (PromptMode::Rag, Some(context)) => format!(
            "参考资料:\n---\n{}\n---\n\n用户问题: {}\n\n请严格按照系统提示的规则回答问题。",
            context, query
        ),
        _ => query.to_string(),
    };
    messages.push(ChatMessage::user(user_turn));

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_serialized_in_order_between_system_and_user() {
        let history = vec![
            ChatMessage::user("第一问"),
            ChatMessage::assistant("第一答"),
            ChatMessage::user("第二问"),
            ChatMessage::assistant("第二答"),
        ];

        let messages = assemble(PromptMode::General, "当前问题", &history, None);

        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "第一问");
        assert_eq!(messages[4].content, "第二答");
        assert_eq!(messages[5].role, "user");
        assert_eq!(messages[5].content, "当前问题");
    }

    #[test]
    fn rag_mode_wraps_context_into_the_user_turn() {
        let messages = assemble(PromptMode::Rag, "做过什么项目", &[], Some("项目A：负责登录模块"));

        let user = messages.last().unwrap();
        assert!(user.content.contains("参考资料"));
        assert!(user.content.contains("项目A：负责登录模块"));
        assert!(user.content.contains("做过什么项目"));
    }

    #[test]
    fn blank_and_foreign_roles_are_dropped() {
        let history = vec![
            ChatMessage::system("ignored"),
            ChatMessage::user("   "),
            ChatMessage::user("kept"),
        ];

        let messages = assemble(PromptMode::General, "q", &history, None);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "kept");
    }
}
