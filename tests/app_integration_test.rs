//! 应用层集成测试：历史文件夹、标题重命名、文档上传、用户画像（Mock 模型，临时目录）

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use toolchat::app::ChatApp;
    use toolchat::config::AppConfig;
    use toolchat::llm::{MockLlmClient, MockReply};
    use toolchat::memory::Role;
    use toolchat::tools::ToolRegistry;

    fn app(dir: &std::path::Path, llm: Arc<MockLlmClient>) -> ChatApp {
        let mut config = AppConfig::default();
        config.llm.provider = "mock".to_string();
        config.history.dir = dir.join("history");
        config.knowledge.store_path = None;
        ChatApp::with_components(config, llm, ToolRegistry::new()).unwrap()
    }

    #[tokio::test]
    async fn test_first_turn_creates_titled_history() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::with_replies([
            MockReply::text("Hi! How can I help?"),
            MockReply::text("Greeting chat"),
        ]));
        let mut app = app(dir.path(), llm);

        let outcome = app.submit("hello", None).await;
        assert_eq!(outcome.text(), "Hi! How can I help?");
        assert_eq!(app.conversation_name().as_deref(), Some("Greeting_chat"));

        let names = app.list_history().unwrap();
        assert_eq!(names, vec!["Greeting_chat".to_string()]);

        // 标题生成不进入主对话
        assert_eq!(app.controller().state().len(), 3);

        app.submit("bye", None).await;
        app.load_history("Greeting_chat").unwrap();
        let restored: Vec<(Role, String)> = app
            .controller()
            .state()
            .all()
            .iter()
            .skip(1)
            .map(|m| (m.role, m.content.clone()))
            .collect();
        assert_eq!(restored.len(), 4);
        assert_eq!(restored[0], (Role::User, "hello".to_string()));
        assert_eq!(restored[1], (Role::Assistant, "Hi! How can I help?".to_string()));
        assert_eq!(restored[2].0, Role::User);
    }

    #[tokio::test]
    async fn test_uploaded_document_feeds_model() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("france.txt");
        std::fs::write(&doc, "Paris is the capital of France. Lyon is known for food.").unwrap();
        let llm = Arc::new(MockLlmClient::new());
        let mut app = app(dir.path(), llm.clone());

        app.upload(&doc).unwrap();
        app.submit("What is the capital of France?", None).await;

        let sent = llm.requests()[0].messages.last().unwrap().model_content().to_string();
        assert!(sent.contains("Paris is the capital of France."));
        assert!(sent.contains("What is the capital of France?"));
        assert_eq!(
            app.controller().state().all()[1].content,
            "What is the capital of France?"
        );
    }

    #[tokio::test]
    async fn test_profile_is_short_and_leaves_state_alone() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::with_replies([
            MockReply::text("Sure."),
            MockReply::text("Rust"),
            MockReply::text(&"喜欢编程的开发者".repeat(10)),
        ]));
        let mut app = app(dir.path(), llm);

        assert!(app.user_profile().await.is_err());

        app.submit("I write Rust every day", None).await;
        let before = app.controller().state().len();
        let profile = app.user_profile().await.unwrap();
        assert_eq!(profile.chars().count(), 50);
        assert_eq!(app.controller().state().len(), before);
    }

    #[tokio::test]
    async fn test_new_conversation_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path(), Arc::new(MockLlmClient::new()));
        app.submit("first", None).await;
        app.new_conversation();
        assert_eq!(app.controller().state().len(), 1);
        assert!(app.conversation_name().is_none());
    }
}
