use recipe_protocol::{Confirmation, InboundFrame, MemberInfo, ModificationEntry, OutboundFrame};
use recipe_sessions::{
    ChatKind, ChatLogStore, ChatRole, DialogSession, DialogState, PendingConfirmation, Personalization,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::classifier::{AllergyDislikeDetector, Declaration, DeclarationKind, Intent, IntentClassifier};
use crate::constraints::{self, ConstraintOutcome};
use crate::gateway::{ChatMessage, ChatRequest, LlmGateway, RetrievalGateway, WebSearchGateway};
use crate::pipeline::{ModifyOutcome, ModifyPipelineExecutor, SearchOutcome, SearchPipelineExecutor};
use crate::postprocessor::post_process;
use crate::progress::StageTracker;

/// The outer state machine (§4.7): receives each inbound frame, dispatches to
/// the classifier, the constraint engine, or one of the two pipeline
/// executors, and produces the outbound frame sequence. Owns no session
/// state itself — every `DialogSession` is owned and mutated by its
/// connection task, passed in by `&mut` (§5, §9).
pub struct DialogController<'a> {
    pub llm: &'a dyn LlmGateway,
    pub retrieval: &'a dyn RetrievalGateway,
    pub web_search: Option<&'a dyn WebSearchGateway>,
    pub store: &'a dyn ChatLogStore,
    pub top_k: usize,
    pub rerank: bool,
}

impl<'a> DialogController<'a> {
    /// `tracker`, when present, is updated by whichever pipeline executor
    /// runs so a concurrently-running progress emitter can report which
    /// stage is in flight (§4.4, §9). Frames that never enter a pipeline
    /// (init, off-topic, declarations) ignore it.
    pub async fn handle(
        &self,
        session: &mut DialogSession,
        frame: InboundFrame,
        cancel: &CancellationToken,
        tracker: Option<&StageTracker>,
    ) -> Vec<OutboundFrame> {
        match frame {
            InboundFrame::InitContext {
                member_info,
                initial_history,
                modification_history,
            } => self.handle_init_context(session, member_info, initial_history, modification_history),
            InboundFrame::UserMessage { content } => {
                self.handle_user_message(session, &content, cancel, tracker).await
            }
            InboundFrame::ConstraintConfirmation { confirmation } => {
                self.handle_ledger_confirmation(session, confirmation, cancel, tracker).await
            }
            InboundFrame::AllergyConfirmation { confirmation } => {
                self.handle_dislike_confirmation(session, confirmation, cancel, tracker).await
            }
        }
    }

    fn handle_init_context(
        &self,
        session: &mut DialogSession,
        member_info: MemberInfo,
        initial_history: Vec<recipe_protocol::HistoryTurn>,
        modification_history: Vec<ModificationEntry>,
    ) -> Vec<OutboundFrame> {
        session.personalization = Personalization::from_member_info(&member_info);
        session.message_log = initial_history;
        session.modification_ledger = modification_history;

        let member_id = session.personalization.as_ref().map(|p| p.member_id.0);
        let db_session_id = match self.store.create_session(member_id) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to create persisted session row");
                None
            }
        };
        session.db_session_id = db_session_id;

        vec![OutboundFrame::SessionInitialized {
            session_id: session.session_id.to_string(),
            db_session_id,
        }]
    }

    async fn handle_user_message(
        &self,
        session: &mut DialogSession,
        content: &str,
        cancel: &CancellationToken,
        tracker: Option<&StageTracker>,
    ) -> Vec<OutboundFrame> {
        if session.state != DialogState::Idle {
            warn!(state = ?session.state, "user_message received outside IDLE, ignoring (protocol violation)");
            return Vec::new();
        }

        session.push_turn("user", content, None);
        self.persist_turn(session, ChatRole::User, content);

        let history_has_recipe = session.recent_history_has_recipe();
        let classifier = IntentClassifier::new(self.llm);
        let intent = classifier.classify(content, history_has_recipe, cancel).await;

        match intent {
            Intent::RecipeSearch => self.attempt_search(session, content, cancel, tracker).await,
            Intent::RecipeModify => self.handle_modify(session, content, cancel, tracker).await,
            Intent::CookingQuestion | Intent::NotCooking => {
                if session.is_authenticated() {
                    let detector = AllergyDislikeDetector::new(self.llm);
                    if let Some(declaration) = detector.detect(content, history_has_recipe, cancel).await {
                        return self.emit_declaration(session, declaration);
                    }
                }
                if intent == Intent::NotCooking {
                    self.emit_off_topic(session)
                } else {
                    self.answer_cooking_question(session, content, cancel).await
                }
            }
        }
    }

    fn emit_declaration(&self, session: &mut DialogSession, declaration: Declaration) -> Vec<OutboundFrame> {
        session.state = DialogState::Idle;
        let (detected_type, content) = match declaration.kind {
            DeclarationKind::Allergy => ("allergy", "알레르기 정보를 프로필에 추가할까요?"),
            DeclarationKind::Dislike => ("dislike", "싫어하는 재료로 프로필에 추가할까요?"),
        };
        vec![OutboundFrame::AllergyDislikeDetected {
            content: content.to_string(),
            detected_type: detected_type.to_string(),
            detected_items: declaration.items.into_iter().collect(),
            show_button: true,
        }]
    }

    fn emit_off_topic(&self, session: &mut DialogSession) -> Vec<OutboundFrame> {
        session.state = DialogState::Idle;
        vec![OutboundFrame::ChatExternal {
            content: "요리와 관련된 질문만 도와드릴 수 있어요. 다른 요리 질문이 있으신가요?".to_string(),
        }]
    }

    async fn answer_cooking_question(
        &self,
        session: &mut DialogSession,
        content: &str,
        cancel: &CancellationToken,
    ) -> Vec<OutboundFrame> {
        session.state = DialogState::Idle;
        let req = ChatRequest {
            messages: vec![
                ChatMessage::system("요리에 관한 질문에 간결하고 친절하게 답하세요."),
                ChatMessage::user(content.to_string()),
            ],
            temperature: 0.5,
            max_tokens: 256,
        };

        match self.llm.chat(req, cancel).await {
            Ok(resp) => {
                session.push_turn("assistant", resp.content.clone(), None);
                self.persist_turn(session, ChatRole::Agent, &resp.content);
                vec![OutboundFrame::AgentMessage {
                    content: resp.content,
                    image: None,
                    hide_image: None,
                    modification_history: None,
                }]
            }
            Err(e) => {
                warn!(error = %e, "cooking question answer failed");
                vec![OutboundFrame::error("답변을 생성하지 못했습니다.")]
            }
        }
    }

    async fn handle_modify(
        &self,
        session: &mut DialogSession,
        content: &str,
        cancel: &CancellationToken,
        tracker: Option<&StageTracker>,
    ) -> Vec<OutboundFrame> {
        session.state = DialogState::PipelineRunning;
        let prior = session.find_prior_recipe().cloned();
        let executor = ModifyPipelineExecutor { llm: self.llm };
        let outcome = executor.run(content, prior.as_ref(), cancel, tracker).await;

        match outcome {
            ModifyOutcome::NoPriorRecipe => {
                session.state = DialogState::Idle;
                self.attempt_search(session, content, cancel, tracker).await
            }
            ModifyOutcome::Cancelled(report) => {
                session.state = DialogState::Idle;
                report.log_summary();
                vec![timeout_reply(report.real_elapsed().as_secs_f64())]
            }
            ModifyOutcome::Completed(result) => {
                session.state = DialogState::Idle;
                let processed = post_process(&result.content);
                session.append_modification(result.entry);
                session.last_assistant_response = Some(processed.clone());
                session.push_turn("assistant", processed.clone(), None);
                self.persist_turn(session, ChatRole::Agent, &processed);
                result.report.log_summary();

                let image = prior.as_ref().and_then(|p| p.image.clone());
                vec![OutboundFrame::AgentMessage {
                    content: processed,
                    image,
                    hide_image: Some(true),
                    modification_history: Some(session.modification_ledger.clone()),
                }]
            }
        }
    }

    async fn handle_dislike_confirmation(
        &self,
        session: &mut DialogSession,
        confirmation: Confirmation,
        cancel: &CancellationToken,
        tracker: Option<&StageTracker>,
    ) -> Vec<OutboundFrame> {
        if session.state != DialogState::AwaitingDislikeConfirmation {
            warn!(state = ?session.state, "allergy_confirmation received outside awaiting-dislike state, ignoring");
            return Vec::new();
        }

        let Some(PendingConfirmation::Dislike { query, matched_dislikes }) = session.pending.clone() else {
            warn!("awaiting-dislike state with no pending dislike confirmation recorded");
            session.state = DialogState::Idle;
            return vec![OutboundFrame::error("internal state error")];
        };
        session.clear_pending();

        if confirmation.is_yes() {
            constraints::apply_dislike_confirmation(session, &matched_dislikes);
            session.state = DialogState::Idle;
            self.attempt_search(session, &query, cancel, tracker).await
        } else {
            session.state = DialogState::Idle;
            vec![neutral_decline_reply()]
        }
    }

    async fn handle_ledger_confirmation(
        &self,
        session: &mut DialogSession,
        confirmation: Confirmation,
        cancel: &CancellationToken,
        tracker: Option<&StageTracker>,
    ) -> Vec<OutboundFrame> {
        if session.state != DialogState::AwaitingLedgerConfirmation {
            warn!(state = ?session.state, "constraint_confirmation received outside awaiting-ledger state, ignoring");
            return Vec::new();
        }

        let Some(PendingConfirmation::Ledger {
            query,
            conflicted_ingredients,
        }) = session.pending.clone()
        else {
            warn!("awaiting-ledger state with no pending ledger confirmation recorded");
            session.state = DialogState::Idle;
            return vec![OutboundFrame::error("internal state error")];
        };
        session.clear_pending();

        if confirmation.is_yes() {
            constraints::apply_ledger_confirmation(session, &conflicted_ingredients);
            session.state = DialogState::Idle;
            self.attempt_search(session, &query, cancel, tracker).await
        } else {
            session.state = DialogState::Idle;
            vec![neutral_decline_reply()]
        }
    }

    async fn attempt_search(
        &self,
        session: &mut DialogSession,
        query: &str,
        cancel: &CancellationToken,
        tracker: Option<&StageTracker>,
    ) -> Vec<OutboundFrame> {
        match constraints::check(session, query) {
            ConstraintOutcome::HardBlock { content } => {
                session.state = DialogState::Idle;
                vec![OutboundFrame::AgentMessage {
                    content,
                    image: None,
                    hide_image: None,
                    modification_history: None,
                }]
            }
            ConstraintOutcome::DislikePending { matched } => {
                session.pending = Some(PendingConfirmation::Dislike {
                    query: query.to_string(),
                    matched_dislikes: matched.clone(),
                });
                session.state = DialogState::AwaitingDislikeConfirmation;
                let names: Vec<&str> = matched.iter().map(|s| s.as_str()).collect();
                vec![OutboundFrame::AllergyWarning {
                    content: format!("{}을(를) 싫어하시는 것으로 알고 있는데, 그래도 진행할까요?", names.join(", ")),
                    matched_dislikes: matched.into_iter().collect(),
                    show_confirmation: true,
                }]
            }
            ConstraintOutcome::LedgerPending { conflicted } => {
                session.pending = Some(PendingConfirmation::Ledger {
                    query: query.to_string(),
                    conflicted_ingredients: conflicted.clone(),
                });
                session.state = DialogState::AwaitingLedgerConfirmation;
                let names: Vec<&str> = conflicted.iter().map(|s| s.as_str()).collect();
                vec![OutboundFrame::ConstraintWarning {
                    content: format!(
                        "이전에 {}을(를) 빼달라고 하셨는데 이번 요청과 충돌해요. 그래도 진행할까요?",
                        names.join(", ")
                    ),
                    conflicted_ingredients: conflicted.into_iter().collect(),
                    show_confirmation: true,
                }]
            }
            ConstraintOutcome::Proceed => {
                session.state = DialogState::PipelineRunning;
                self.run_search_pipeline(session, query, cancel, tracker).await
            }
        }
    }

    async fn run_search_pipeline(
        &self,
        session: &mut DialogSession,
        query: &str,
        cancel: &CancellationToken,
        tracker: Option<&StageTracker>,
    ) -> Vec<OutboundFrame> {
        let executor = SearchPipelineExecutor {
            llm: self.llm,
            retrieval: self.retrieval,
            web_search: self.web_search,
            top_k: self.top_k,
            rerank: self.rerank,
        };
        let outcome = executor
            .run(
                query,
                &session.message_log,
                session.personalization.as_ref(),
                &session.modification_ledger,
                cancel,
                tracker,
            )
            .await;

        session.state = DialogState::Idle;
        match outcome {
            SearchOutcome::Completed(result) => {
                let processed = post_process(&result.content);
                session.last_documents = result.documents;
                session.last_assistant_response = Some(processed.clone());
                session.push_turn("assistant", processed.clone(), None);
                self.persist_turn(session, ChatRole::Agent, &processed);
                result.report.log_summary();
                vec![OutboundFrame::AgentMessage {
                    content: processed,
                    image: None,
                    hide_image: None,
                    modification_history: None,
                }]
            }
            SearchOutcome::Cancelled(report) => {
                report.log_summary();
                vec![timeout_reply(report.real_elapsed().as_secs_f64())]
            }
        }
    }

    fn persist_turn(&self, session: &DialogSession, role: ChatRole, content: &str) {
        if let Some(db_id) = session.db_session_id {
            if let Err(e) = self.store.append_turn(db_id, role, ChatKind::Generate, content) {
                warn!(error = %e, "failed to persist chat turn");
            }
        }
    }
}

fn timeout_reply(elapsed_secs: f64) -> OutboundFrame {
    OutboundFrame::AgentMessage {
        content: format!("요청 처리 시간이 초과되었습니다 ({elapsed_secs:.1}초). 다시 시도해 주세요."),
        image: None,
        hide_image: None,
        modification_history: None,
    }
}

fn neutral_decline_reply() -> OutboundFrame {
    OutboundFrame::AgentMessage {
        content: "알겠습니다. 다른 요청을 도와드릴까요?".to_string(),
        image: None,
        hide_image: None,
        modification_history: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FixedRetrievalGateway, HangingLlmGateway, ScriptedLlmGateway};
    use recipe_core::SessionId;
    use recipe_protocol::ModificationType;
    use recipe_sessions::NoopChatLogStore;

    fn controller<'a>(
        llm: &'a dyn LlmGateway,
        retrieval: &'a dyn RetrievalGateway,
        store: &'a dyn ChatLogStore,
    ) -> DialogController<'a> {
        DialogController {
            llm,
            retrieval,
            web_search: None,
            store,
            top_k: 3,
            rerank: false,
        }
    }

    #[tokio::test]
    async fn s1_off_topic_redirect() {
        let llm = ScriptedLlmGateway::new(["NOT_COOKING"]);
        let retrieval = FixedRetrievalGateway { documents: vec![] };
        let store = NoopChatLogStore;
        let ctl = controller(&llm, &retrieval, &store);
        let mut session = DialogSession::new(SessionId::new());

        let frames = ctl
            .handle(
                &mut session,
                InboundFrame::UserMessage {
                    content: "오늘 날씨 어때".into(),
                },
                &CancellationToken::new(),
                None,
            )
            .await;
        assert!(matches!(frames.as_slice(), [OutboundFrame::ChatExternal { .. }]));
        assert_eq!(session.state, DialogState::Idle);
    }

    #[tokio::test]
    async fn s2_allergy_hard_block_never_pends() {
        let llm = ScriptedLlmGateway::new(["RECIPE_SEARCH"]);
        let retrieval = FixedRetrievalGateway { documents: vec![] };
        let store = NoopChatLogStore;
        let ctl = controller(&llm, &retrieval, &store);
        let mut session = DialogSession::new(SessionId::new());

        let member_info = MemberInfo {
            member_id: Some(1),
            allergies: vec!["새우".into()],
            ..Default::default()
        };
        ctl.handle(
            &mut session,
            InboundFrame::InitContext {
                member_info,
                initial_history: vec![],
                modification_history: vec![],
            },
            &CancellationToken::new(),
            None,
        )
        .await;

        let frames = ctl
            .handle(
                &mut session,
                InboundFrame::UserMessage {
                    content: "새우 볶음 레시피 알려줘".into(),
                },
                &CancellationToken::new(),
                None,
            )
            .await;
        match frames.as_slice() {
            [OutboundFrame::AgentMessage { content, .. }] => assert!(content.contains("새우")),
            other => panic!("expected hard-block agent_message, got {other:?}"),
        }
        assert_eq!(session.state, DialogState::Idle);
        assert!(session.pending.is_none());
    }

    #[tokio::test]
    async fn s3_dislike_confirm_then_retry_succeeds() {
        let llm = ScriptedLlmGateway::new(["RECIPE_SEARCH", "당근 케이크", "당근케이크\n재료: 당근 2개"]);
        let retrieval = FixedRetrievalGateway { documents: vec![] };
        let store = NoopChatLogStore;
        let ctl = controller(&llm, &retrieval, &store);
        let mut session = DialogSession::new(SessionId::new());

        let member_info = MemberInfo {
            member_id: Some(1),
            dislikes: vec!["당근".into()],
            ..Default::default()
        };
        ctl.handle(
            &mut session,
            InboundFrame::InitContext {
                member_info,
                initial_history: vec![],
                modification_history: vec![],
            },
            &CancellationToken::new(),
            None,
        )
        .await;

        let frames = ctl
            .handle(
                &mut session,
                InboundFrame::UserMessage {
                    content: "당근 케이크 레시피".into(),
                },
                &CancellationToken::new(),
                None,
            )
            .await;
        assert!(matches!(frames.as_slice(), [OutboundFrame::AllergyWarning { .. }]));
        assert_eq!(session.state, DialogState::AwaitingDislikeConfirmation);

        let frames = ctl
            .handle(
                &mut session,
                InboundFrame::AllergyConfirmation {
                    confirmation: Confirmation::Yes,
                },
                &CancellationToken::new(),
                None,
            )
            .await;
        match frames.as_slice() {
            [OutboundFrame::AgentMessage { content, .. }] => assert!(content.contains("재료:")),
            other => panic!("expected retried agent_message, got {other:?}"),
        }
        assert!(session.temporarily_allowed_dislikes.contains("당근"));
        assert_eq!(session.state, DialogState::Idle);
    }

    #[tokio::test]
    async fn s4_modification_then_ledger_conflict_confirmed() {
        let llm = ScriptedLlmGateway::new(["RECIPE_SEARCH", "돼지고기 김치찌개", "김치찌개\n재료: 돼지고기 300g"]);
        let retrieval = FixedRetrievalGateway { documents: vec![] };
        let store = NoopChatLogStore;
        let ctl = controller(&llm, &retrieval, &store);
        let mut session = DialogSession::new(SessionId::new());

        let modification_history = vec![ModificationEntry {
            request: "돼지고기 빼줘".into(),
            kind: ModificationType::Remove,
            remove_ingredients: vec!["돼지고기".into()],
            add_ingredients: vec![],
            timestamp: "2026-07-28T00:00:00Z".into(),
        }];
        ctl.handle(
            &mut session,
            InboundFrame::InitContext {
                member_info: MemberInfo::default(),
                initial_history: vec![],
                modification_history,
            },
            &CancellationToken::new(),
            None,
        )
        .await;

        let frames = ctl
            .handle(
                &mut session,
                InboundFrame::UserMessage {
                    content: "돼지고기 김치찌개 레시피".into(),
                },
                &CancellationToken::new(),
                None,
            )
            .await;
        assert!(matches!(frames.as_slice(), [OutboundFrame::ConstraintWarning { .. }]));
        assert_eq!(session.state, DialogState::AwaitingLedgerConfirmation);

        let frames = ctl
            .handle(
                &mut session,
                InboundFrame::ConstraintConfirmation {
                    confirmation: Confirmation::Yes,
                },
                &CancellationToken::new(),
                None,
            )
            .await;
        assert!(matches!(frames.as_slice(), [OutboundFrame::AgentMessage { .. }]));
        assert!(session.modification_ledger.is_empty());
        assert_eq!(session.state, DialogState::Idle);
    }

    #[tokio::test]
    async fn s5_replace_overrides_remove_end_to_end() {
        let llm = ScriptedLlmGateway::new(["RECIPE_SEARCH", "돼지고기 요리", "요리\n재료: 참치 200g"]);
        let retrieval = FixedRetrievalGateway { documents: vec![] };
        let store = NoopChatLogStore;
        let ctl = controller(&llm, &retrieval, &store);
        let mut session = DialogSession::new(SessionId::new());

        let modification_history = vec![ModificationEntry {
            request: "돼지고기 말고 참치 넣어줘".into(),
            kind: ModificationType::Replace,
            remove_ingredients: vec!["돼지고기".into()],
            add_ingredients: vec!["참치".into()],
            timestamp: "2026-07-28T00:00:00Z".into(),
        }];
        ctl.handle(
            &mut session,
            InboundFrame::InitContext {
                member_info: MemberInfo::default(),
                initial_history: vec![],
                modification_history,
            },
            &CancellationToken::new(),
            None,
        )
        .await;

        let frames = ctl
            .handle(
                &mut session,
                InboundFrame::UserMessage {
                    content: "돼지고기 요리 알려줘".into(),
                },
                &CancellationToken::new(),
                None,
            )
            .await;
        match frames.as_slice() {
            [OutboundFrame::AgentMessage { content, .. }] => assert!(content.contains("참치")),
            other => panic!("expected proceed-to-generate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn s6_cancellation_at_deadline_emits_timeout_reply() {
        let llm = HangingLlmGateway;
        let retrieval = FixedRetrievalGateway { documents: vec![] };
        let store = NoopChatLogStore;
        let ctl = controller(&llm, &retrieval, &store);
        let mut session = DialogSession::new(SessionId::new());
        let cancel = CancellationToken::new();

        // Fire the cancellation after a real delay, rather than pre-cancelling,
        // so the reported elapsed time reflects actual wall clock spent
        // waiting on the hung LLM call rather than being a fixed near-zero.
        let deadline_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(120)).await;
            deadline_cancel.cancel();
        });

        let frames = ctl
            .handle(
                &mut session,
                InboundFrame::UserMessage {
                    content: "당근 케이크".into(),
                },
                &cancel,
                None,
            )
            .await;
        match frames.as_slice() {
            [OutboundFrame::AgentMessage { content, .. }] => {
                assert!(content.contains("초과"));
                let elapsed = content
                    .split('(')
                    .nth(1)
                    .and_then(|s| s.split('초').next())
                    .and_then(|s| s.parse::<f64>().ok())
                    .expect("timeout reply should carry a parsable elapsed-seconds figure");
                assert!(elapsed > 0.0, "expected non-zero elapsed seconds, got {elapsed} from {content:?}");
            }
            other => panic!("expected timeout reply, got {other:?}"),
        }
        assert_eq!(session.state, DialogState::Idle);
    }

    #[tokio::test]
    async fn dislike_confirmation_in_wrong_state_is_ignored() {
        let llm = ScriptedLlmGateway::new([]);
        let retrieval = FixedRetrievalGateway { documents: vec![] };
        let store = NoopChatLogStore;
        let ctl = controller(&llm, &retrieval, &store);
        let mut session = DialogSession::new(SessionId::new());

        let frames = ctl
            .handle(
                &mut session,
                InboundFrame::AllergyConfirmation {
                    confirmation: Confirmation::Yes,
                },
                &CancellationToken::new(),
                None,
            )
            .await;
        assert!(frames.is_empty());
        assert_eq!(session.state, DialogState::Idle);
    }
}
