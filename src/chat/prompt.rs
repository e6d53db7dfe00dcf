//! 提示词模板与流式过渡标记

/// 默认系统提示词
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是个好助手";

/// 工具执行完毕后发给 sink 的过渡标记
pub const TOOLS_FINISHED_MARKER: &str = "\n[Tools finished, generating answer...]\n";

/// 知识库检索命中时，实际发给模型的用户消息
pub fn knowledge_prompt(snippets: &[String], input: &str) -> String {
    let joined = snippets.join(" ");
    let content = joined.trim_end().trim_end_matches(|c: char| c == '.' || c == '。');
    let question = input.trim_end();
    let end = if question.ends_with(|c: char| SENTENCE_END.contains(&c)) { "" } else { "." };
    format!(
        "Answer the question based on the document content: {}. Question: {}{}",
        content, question, end
    )
}

const SENTENCE_END: [char; 6] = ['.', '?', '!', '。', '？', '！'];

/// 即将执行工具时发给 sink 的过渡标记
pub fn tools_running_marker(names: &[String]) -> String {
    format!("\n[Calling tools: {}]\n", names.join(", "))
}

/// 把首个问题精简成对话标题
pub fn title_prompt(first_question: &str) -> String {
    format!(
        "请将以下问题精简成一个不超过10个字的短标题，这个标题将用作文件夹名称，请不要包含任何标点符号或特殊字符：\n\n'{}'",
        first_question
    )
}

/// 根据全部历史总结用户画像
pub fn profile_prompt(transcript: &str) -> String {
    format!(
        "请根据以下对话历史总结出用户画像（即用户特点），请用自然语言，不要包含任何标点符号或特殊字符，并且控制在50字以内:\n\n{}",
        transcript
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knowledge_prompt_keeps_question() {
        let p = knowledge_prompt(
            &["Paris is the capital of France.".to_string()],
            "What is the capital of France?",
        );
        assert_eq!(
            p,
            "Answer the question based on the document content: Paris is the capital of France. Question: What is the capital of France?"
        );
        assert!(!p.contains(".."));
    }

    #[test]
    fn test_knowledge_prompt_terminates_plain_question() {
        let p = knowledge_prompt(&["巴黎是法国首都。".to_string()], "法国首都是哪里");
        assert_eq!(
            p,
            "Answer the question based on the document content: 巴黎是法国首都. Question: 法国首都是哪里."
        );
    }

    #[test]
    fn test_running_marker_names_tools() {
        let m = tools_running_marker(&["exec_code".to_string(), "create_ppt".to_string()]);
        assert!(m.contains("exec_code, create_ppt"));
    }
}
