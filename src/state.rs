use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::config::{AppPaths, Settings};
use crate::llm::{LanguageModel, OpenAiCompatProvider};
use crate::rag::{AnswerEngine, CitationResolver};
use crate::security::{init_api_token, ApiToken};
use crate::storage::{ConversationStore, SqliteStore};

pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Settings,
    pub store: Arc<dyn ConversationStore>,
    pub llm: Arc<dyn LanguageModel>,
    pub engine: AnswerEngine,
    pub citations: CitationResolver,
    pub api_token: ApiToken,
    #[allow(dead_code)]
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let settings = Settings::load(&paths);
        let api_token = init_api_token(&paths);

        let store: Arc<dyn ConversationStore> = Arc::new(SqliteStore::new(&paths).await?);
        let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiCompatProvider::new(&settings.llm));

        let engine = AnswerEngine::new(store.clone(), llm.clone(), settings.rag.clone());
        let citations = CitationResolver::new(store.clone());

        Ok(Arc::new(AppState {
            paths,
            settings,
            store,
            llm,
            engine,
            citations,
            api_token,
            started_at: Utc::now(),
        }))
    }
}
