use std::time::Instant;

use recipe_core::{Document, StageName};
use recipe_protocol::HistoryTurn;
use recipe_sessions::{ledger, Personalization};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{LlmError, RetrievalError, WebSearchError};
use crate::gateway::{ChatMessage, ChatRequest, LlmGateway, RetrievalGateway, WebSearchGateway};
use crate::progress::StageTracker;
use crate::report::PipelineReport;

pub struct SearchResult {
    pub content: String,
    pub documents: Vec<Document>,
    pub report: PipelineReport,
}

pub enum SearchOutcome {
    Completed(SearchResult),
    Cancelled(PipelineReport),
}

/// Runs the six-stage search graph (§4.4): rewrite → retrieve → constraint
/// marker → grade relevance → (optional web search) → generate → post-process
/// is applied by the caller. Every LLM/retrieval/web-search call shares one
/// `CancellationToken`; a `Cancelled` variant surfacing from any of them
/// short-circuits the whole run rather than being treated as a recoverable
/// transport failure.
pub struct SearchPipelineExecutor<'a> {
    pub llm: &'a dyn LlmGateway,
    pub retrieval: &'a dyn RetrievalGateway,
    pub web_search: Option<&'a dyn WebSearchGateway>,
    pub top_k: usize,
    pub rerank: bool,
}

impl<'a> SearchPipelineExecutor<'a> {
    pub async fn run(
        &self,
        query: &str,
        history: &[HistoryTurn],
        personalization: Option<&Personalization>,
        modification_ledger: &[recipe_protocol::ModificationEntry],
        cancel: &CancellationToken,
        tracker: Option<&StageTracker>,
    ) -> SearchOutcome {
        let mut report = PipelineReport::default();

        if let Some(t) = tracker {
            t.enter(StageName::Rewrite);
        }
        let rewritten = match self.rewrite(query, history, cancel, &mut report).await {
            Ok(q) => q,
            Err(()) => return SearchOutcome::Cancelled(report),
        };

        if let Some(t) = tracker {
            t.enter(StageName::Retrieve);
        }
        let mut documents = match self.retrieve(&rewritten, cancel, &mut report).await {
            Ok(docs) => docs,
            Err(RetrieveFailure::Cancelled) => return SearchOutcome::Cancelled(report),
            Err(RetrieveFailure::Transport) => {
                if let Some(t) = tracker {
                    t.enter(StageName::WebSearch);
                }
                match self.web_search(&rewritten, cancel, &mut report).await {
                    Ok(docs) => docs,
                    Err(()) => return SearchOutcome::Cancelled(report),
                }
            }
        };

        self.mark_constraints(&mut documents, personalization, modification_ledger, &mut report);

        if let Some(t) = tracker {
            t.enter(StageName::GradeRelevance);
        }
        let needs_web_search = match self
            .grade_relevance(&rewritten, &documents, cancel, &mut report)
            .await
        {
            Ok(needs) => needs,
            Err(()) => return SearchOutcome::Cancelled(report),
        };

        if needs_web_search {
            if let Some(t) = tracker {
                t.enter(StageName::WebSearch);
            }
            documents = match self.web_search(&rewritten, cancel, &mut report).await {
                Ok(docs) => docs,
                Err(()) => return SearchOutcome::Cancelled(report),
            };
        }

        let constraints = ledger::modification_constraints(modification_ledger);
        let servings = personalization.map(Personalization::default_servings).unwrap_or(1);

        if let Some(t) = tracker {
            t.enter(StageName::Generate);
        }
        let content = match self
            .generate(&rewritten, history, personalization, &constraints, servings, &documents, cancel, &mut report)
            .await
        {
            Ok(c) => c,
            Err(()) => return SearchOutcome::Cancelled(report),
        };

        SearchOutcome::Completed(SearchResult {
            content,
            documents,
            report,
        })
    }

    async fn rewrite(
        &self,
        query: &str,
        history: &[HistoryTurn],
        cancel: &CancellationToken,
        report: &mut PipelineReport,
    ) -> Result<String, ()> {
        let recent: String = history
            .iter()
            .rev()
            .take(4)
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" / ");

        let req = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "사용자의 최근 대화와 발화를 보고 검색에 쓸 요리 이름만 1~5단어로 줄여 답하세요.",
                ),
                ChatMessage::user(format!("최근 대화: {recent}\n발화: {query}")),
            ],
            temperature: 0.0,
            max_tokens: 16,
        };

        let start = Instant::now();
        match self.llm.chat(req, cancel).await {
            Ok(resp) => {
                report.record(StageName::Rewrite, start.elapsed(), resp.usage);
                let trimmed = resp.content.trim();
                if trimmed.is_empty() {
                    Ok(query.to_string())
                } else {
                    Ok(trimmed.to_string())
                }
            }
            Err(LlmError::Cancelled) => Err(()),
            Err(e) => {
                warn!(error = %e, "rewrite stage failed, passing utterance through unchanged");
                report.record(StageName::Rewrite, start.elapsed(), Default::default());
                Ok(query.to_string())
            }
        }
    }

    async fn retrieve(
        &self,
        query: &str,
        cancel: &CancellationToken,
        report: &mut PipelineReport,
    ) -> Result<Vec<Document>, RetrieveFailure> {
        let start = Instant::now();
        match self.retrieval.search(query, self.top_k, self.rerank, cancel).await {
            Ok(docs) => {
                report.record(StageName::Retrieve, start.elapsed(), Default::default());
                Ok(docs)
            }
            Err(RetrievalError::Cancelled) => Err(RetrieveFailure::Cancelled),
            Err(e) => {
                warn!(error = %e, "retrieval failed, routing to web search");
                report.record(StageName::Retrieve, start.elapsed(), Default::default());
                Err(RetrieveFailure::Transport)
            }
        }
    }

    fn mark_constraints(
        &self,
        documents: &mut [Document],
        personalization: Option<&Personalization>,
        modification_ledger: &[recipe_protocol::ModificationEntry],
        report: &mut PipelineReport,
    ) {
        let start = Instant::now();
        let constrained: Vec<String> = personalization
            .map(|p| p.allergies.iter().chain(p.dislikes.iter()).cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        let ledger_removes = ledger::effective_remove_set(modification_ledger);

        for doc in documents.iter_mut() {
            let content_lower = doc.content.to_lowercase();
            let hit = constrained
                .iter()
                .chain(ledger_removes.iter())
                .find(|name| content_lower.contains(name.as_str()));
            doc.constraint_warning = hit.cloned().unwrap_or_default();
        }
        report.record(StageName::CheckConstraints, start.elapsed(), Default::default());
    }

    async fn grade_relevance(
        &self,
        query: &str,
        documents: &[Document],
        cancel: &CancellationToken,
        report: &mut PipelineReport,
    ) -> Result<bool, ()> {
        let start = Instant::now();
        if documents.is_empty() {
            report.record(StageName::GradeRelevance, start.elapsed(), Default::default());
            return Ok(true);
        }

        let query_tokens: Vec<&str> = query.split_whitespace().filter(|t| t.chars().count() > 1).collect();
        let title_matches = documents
            .iter()
            .take(3)
            .any(|d| query_tokens.iter().any(|t| d.title.contains(t)));
        if !title_matches {
            report.record(StageName::GradeRelevance, start.elapsed(), Default::default());
            return Ok(true);
        }

        let concatenated: String = documents
            .iter()
            .take(3)
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");

        let req = ChatRequest {
            messages: vec![
                ChatMessage::system("검색 결과가 질문과 관련 있으면 YES, 아니면 NO만 답하세요."),
                ChatMessage::user(format!("질문: {query}\n검색 결과: {concatenated}")),
            ],
            temperature: 0.0,
            max_tokens: 4,
        };

        match self.llm.chat(req, cancel).await {
            Ok(resp) => {
                report.record(StageName::GradeRelevance, start.elapsed(), resp.usage);
                Ok(!resp.content.trim().eq_ignore_ascii_case("YES"))
            }
            Err(LlmError::Cancelled) => Err(()),
            Err(e) => {
                warn!(error = %e, "relevance grading failed, routing to web search");
                report.record(StageName::GradeRelevance, start.elapsed(), Default::default());
                Ok(true)
            }
        }
    }

    async fn web_search(
        &self,
        query: &str,
        cancel: &CancellationToken,
        report: &mut PipelineReport,
    ) -> Result<Vec<Document>, ()> {
        let start = Instant::now();
        let Some(gateway) = self.web_search else {
            report.record(StageName::WebSearch, start.elapsed(), Default::default());
            return Ok(Vec::new());
        };

        match gateway.search(query, 3, cancel).await {
            Ok(docs) => {
                report.record(StageName::WebSearch, start.elapsed(), Default::default());
                Ok(docs)
            }
            Err(WebSearchError::Cancelled) => Err(()),
            Err(e) => {
                warn!(error = %e, "web search failed, proceeding with no documents");
                report.record(StageName::WebSearch, start.elapsed(), Default::default());
                Ok(Vec::new())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate(
        &self,
        query: &str,
        history: &[HistoryTurn],
        personalization: Option<&Personalization>,
        constraints: &std::collections::HashSet<String>,
        servings: usize,
        documents: &[Document],
        cancel: &CancellationToken,
        report: &mut PipelineReport,
    ) -> Result<String, ()> {
        let allergy_clause = personalization
            .map(|p| {
                let mut names: Vec<&String> = p.allergies.iter().chain(p.dislikes.iter()).collect();
                names.sort();
                names
            })
            .filter(|names| !names.is_empty())
            .map(|names| format!("다음 재료는 절대 사용하지 마세요: {}.", names.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")))
            .unwrap_or_default();

        let constraints_clause = if constraints.is_empty() {
            String::new()
        } else {
            let mut names: Vec<&String> = constraints.iter().collect();
            names.sort();
            format!("다음 재료는 제외하세요: {}.", names.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "))
        };

        let recent_history: String = history
            .iter()
            .rev()
            .take(4)
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" / ");

        let doc_context: String = documents
            .iter()
            .map(|d| {
                let truncated: String = d.content.chars().take(800).collect();
                format!("[{}]\n{}", d.title, truncated)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "질문: {query}\n{allergy_clause}\n{constraints_clause}\n인분: {servings}\n최근 대화: {recent_history}\n참고 자료:\n{doc_context}\n\n위 참고 자료를 바탕으로 레시피를 작성하세요."
        );

        let req = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "당신은 요리 어시스턴트입니다. 제목, 시간/난이도/인분 메타데이터 줄, \
                     한 줄 소개, '재료:'로 시작하는 재료 목록, 조리법 순서로 답하세요.",
                ),
                ChatMessage::user(prompt),
            ],
            temperature: 0.7,
            max_tokens: 1024,
        };

        let start = Instant::now();
        match self.llm.chat(req, cancel).await {
            Ok(resp) => {
                report.record(StageName::Generate, start.elapsed(), resp.usage);
                Ok(resp.content)
            }
            Err(LlmError::Cancelled) => Err(()),
            Err(e) => {
                warn!(error = %e, "generate stage failed");
                report.record(StageName::Generate, start.elapsed(), Default::default());
                Err(())
            }
        }
    }
}

enum RetrieveFailure {
    Cancelled,
    Transport,
}
