//! 工具箱：注册表、分发器与内置工具（exec_code、create_ppt、recognize_image_text）

pub mod dispatcher;
pub mod exec_code;
pub mod ocr;
pub mod ppt;
pub mod registry;
pub mod schema;

pub use dispatcher::ToolDispatcher;
pub use exec_code::ExecCodeTool;
pub use ocr::{OcrSettings, OcrTool, OCR_RESULT_PREFIX};
pub use ppt::{DeckWriter, MarkdownDeckWriter, OutlineGenerator, PptTool, SlideOutline};
pub use registry::{Tool, ToolDescriptor, ToolRegistry};
pub use schema::parameters_schema_for;
