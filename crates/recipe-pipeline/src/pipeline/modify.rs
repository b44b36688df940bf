use std::time::Instant;

use recipe_core::StageName;
use recipe_protocol::{HistoryTurn, ModificationEntry};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::LlmError;
use crate::extractor::{classify_modification_type, IngredientExtractor};
use crate::gateway::{ChatMessage, ChatRequest, LlmGateway};
use crate::progress::StageTracker;
use crate::report::PipelineReport;

pub struct ModifyResult {
    pub content: String,
    pub entry: ModificationEntry,
    pub report: PipelineReport,
}

pub enum ModifyOutcome {
    Completed(ModifyResult),
    NoPriorRecipe,
    Cancelled(PipelineReport),
}

/// Single-shot recipe mutation path (§4.5): invoked only once the caller has
/// confirmed a prior recipe is findable in history. One LLM call rewrites the
/// prior recipe under the new utterance; the Ingredient Extractor runs
/// independently to build the ledger entry — the two are logically parallel
/// but run sequentially here since both share the same deadline budget and
/// the extractor's own LLM call is cheap (§4.5, §5).
pub struct ModifyPipelineExecutor<'a> {
    pub llm: &'a dyn LlmGateway,
}

impl<'a> ModifyPipelineExecutor<'a> {
    pub async fn run(
        &self,
        utterance: &str,
        prior_recipe: Option<&HistoryTurn>,
        cancel: &CancellationToken,
        tracker: Option<&StageTracker>,
    ) -> ModifyOutcome {
        let Some(prior) = prior_recipe else {
            return ModifyOutcome::NoPriorRecipe;
        };

        let mut report = PipelineReport::default();
        let kind = classify_modification_type(utterance);

        if let Some(t) = tracker {
            t.enter(StageName::Extract);
        }
        let extractor = IngredientExtractor::new(self.llm);
        let extracted = extractor.extract(utterance, kind, cancel).await;

        if let Some(t) = tracker {
            t.enter(StageName::Generate);
        }
        let req = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "기존 레시피를 사용자의 수정 요청에 맞게 다시 작성하세요. \
                     제목, 메타데이터 줄, 한 줄 소개, '재료:' 목록, 조리법 순서로 \
                     완성된 레시피만 답하세요.",
                ),
                ChatMessage::user(format!("기존 레시피:\n{}\n\n수정 요청: {utterance}", prior.content)),
            ],
            temperature: 0.5,
            max_tokens: 1024,
        };

        let start = Instant::now();
        let content = match self.llm.chat(req, cancel).await {
            Ok(resp) => {
                report.record(StageName::Generate, start.elapsed(), resp.usage);
                resp.content
            }
            Err(LlmError::Cancelled) => return ModifyOutcome::Cancelled(report),
            Err(e) => {
                warn!(error = %e, "modification generate stage failed");
                report.record(StageName::Generate, start.elapsed(), Default::default());
                return ModifyOutcome::Cancelled(report);
            }
        };

        let entry = ModificationEntry {
            request: utterance.to_string(),
            kind,
            remove_ingredients: extracted.remove.into_iter().collect(),
            add_ingredients: extracted.add.into_iter().collect(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        ModifyOutcome::Completed(ModifyResult {
            content,
            entry,
            report,
        })
    }
}
