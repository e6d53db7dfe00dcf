//! Toolchat - 工具调用对话助手
//!
//! 入口：初始化日志、加载配置、创建 ChatApp，并运行命令行主循环。
//! 普通输入作为一轮对话（流式输出）；以 / 开头的是命令，/help 查看。

use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use toolchat::app::ChatApp;
use toolchat::config::load_config;

const HELP: &str = "\
commands:
  /new               start a new conversation
  /upload <path>     add a text document to the knowledge base
  /image <path>      recognize image text and send it as input
  /history           list saved conversations
  /load <name>       continue a saved conversation
  /profile           summarise the user from saved conversations
  /sampling <t> <p>  set temperature and top_p
  /usage             show accumulated token usage
  /quit              exit";

/// 把快照中新增的部分打印出来（快照是当前完整文本，过渡标记单独成一条）
struct SnapshotPrinter {
    printed: String,
}

impl SnapshotPrinter {
    fn new() -> Self {
        Self {
            printed: String::new(),
        }
    }

    fn show(&mut self, snapshot: &str) {
        let mut out = std::io::stdout();
        match snapshot.strip_prefix(self.printed.as_str()) {
            Some(delta) => {
                let _ = write!(out, "{}", delta);
            }
            None => {
                let _ = write!(out, "{}", snapshot);
            }
        }
        let _ = out.flush();
        self.printed = snapshot.to_string();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    toolchat::observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    let mut app = ChatApp::new(config).context("Failed to create chat app")?;

    println!("toolchat ready, /help for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };
        match cmd {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/new" => {
                app.new_conversation();
                println!("(new conversation)");
            }
            "/upload" => match app.upload(arg) {
                Ok(()) => println!("(document added: {})", arg),
                Err(e) => println!("upload failed: {:#}", e),
            },
            "/history" => match app.list_history() {
                Ok(names) if names.is_empty() => println!("(no saved conversations)"),
                Ok(names) => names.iter().for_each(|n| println!("  {}", n)),
                Err(e) => println!("history failed: {:#}", e),
            },
            "/load" => match app.load_history(arg) {
                Ok(()) => {
                    for m in app.controller().state().all().iter().skip(1) {
                        println!("[{}] {}", m.role.as_str(), m.content);
                    }
                }
                Err(e) => println!("load failed: {:#}", e),
            },
            "/profile" => match app.user_profile().await {
                Ok(p) => println!("profile: {}", p),
                Err(e) => println!("profile failed: {:#}", e),
            },
            "/sampling" => {
                let mut parts = arg.split_whitespace().map(|s| s.parse::<f32>());
                match (parts.next(), parts.next()) {
                    (Some(Ok(t)), Some(Ok(p))) => {
                        app.controller_mut().set_sampling(t, p);
                        let s = app.controller().sampling();
                        println!("(temperature={}, top_p={})", s.temperature, s.top_p);
                    }
                    _ => println!("usage: /sampling <temperature> <top_p>"),
                }
            }
            "/usage" => {
                let (prompt, completion, total) = app.token_usage();
                println!("tokens: prompt={} completion={} total={}", prompt, completion, total);
            }
            "/image" => {
                let mut printer = SnapshotPrinter::new();
                let mut sink = |s: &str| printer.show(s);
                match app.submit_image(arg, Some(&mut sink)).await {
                    Ok(_) => println!(),
                    Err(e) => println!("image failed: {:#}", e),
                }
            }
            _ if cmd.starts_with('/') => println!("unknown command, /help for commands"),
            _ => {
                let mut printer = SnapshotPrinter::new();
                let mut sink = |s: &str| printer.show(s);
                app.submit(line, Some(&mut sink)).await;
                println!();
            }
        }
    }
    Ok(())
}
