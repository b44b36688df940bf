// Verify wire format matches the documented inbound/outbound frame contract.
// These tests ensure the JSON shape the browser UI depends on never drifts.

use recipe_protocol::{
    Confirmation, HistoryTurn, InboundFrame, MemberInfo, ModificationEntry, ModificationType,
    OutboundFrame,
};

#[test]
fn init_context_round_trip() {
    let json = r#"{
        "type": "init_context",
        "member_info": {
            "member_id": 7,
            "names": ["지민"],
            "allergies": ["새우"],
            "dislikes": ["당근"],
            "utensils": ["에어프라이어"]
        },
        "initial_history": [{"role": "user", "content": "안녕"}],
        "modification_history": []
    }"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    match frame {
        InboundFrame::InitContext {
            member_info,
            initial_history,
            modification_history,
        } => {
            assert_eq!(member_info.member_id, Some(7));
            assert_eq!(member_info.allergies, vec!["새우".to_string()]);
            assert_eq!(initial_history.len(), 1);
            assert!(modification_history.is_empty());
        }
        _ => panic!("expected init_context"),
    }
}

#[test]
fn user_message_parses() {
    let json = r#"{"type":"user_message","content":"당근 케이크 레시피 알려줘"}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert!(matches!(frame, InboundFrame::UserMessage { content } if content.contains("당근")));
}

#[test]
fn allergy_confirmation_yes_parses() {
    let json = r#"{"type":"allergy_confirmation","confirmation":"yes"}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    match frame {
        InboundFrame::AllergyConfirmation { confirmation } => assert!(confirmation.is_yes()),
        _ => panic!("expected allergy_confirmation"),
    }
}

#[test]
fn constraint_confirmation_no_parses() {
    let json = r#"{"type":"constraint_confirmation","confirmation":"no"}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    match frame {
        InboundFrame::ConstraintConfirmation { confirmation } => {
            assert!(!confirmation.is_yes());
            assert_eq!(confirmation, Confirmation::No);
        }
        _ => panic!("expected constraint_confirmation"),
    }
}

#[test]
fn session_initialized_serializes_snake_case_tag() {
    let frame = OutboundFrame::SessionInitialized {
        session_id: "abc-123".into(),
        db_session_id: Some(42),
    };
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains(r#""type":"session_initialized""#));
    assert!(json.contains(r#""session_id":"abc-123""#));
    assert!(json.contains(r#""db_session_id":42"#));
}

#[test]
fn agent_message_omits_absent_optionals() {
    let frame = OutboundFrame::AgentMessage {
        content: "재료: 당근 2개".into(),
        image: None,
        hide_image: None,
        modification_history: None,
    };
    let json = serde_json::to_string(&frame).unwrap();
    assert!(!json.contains("image"));
    assert!(!json.contains("hide_image"));
    assert!(!json.contains("modification_history"));
}

#[test]
fn agent_message_includes_hidden_image_and_ledger() {
    let frame = OutboundFrame::AgentMessage {
        content: "재료: 당근 2개".into(),
        image: Some("https://example.com/prior.jpg".into()),
        hide_image: Some(true),
        modification_history: Some(vec![ModificationEntry {
            request: "돼지고기 빼줘".into(),
            kind: ModificationType::Remove,
            remove_ingredients: vec!["돼지고기".into()],
            add_ingredients: vec![],
            timestamp: "2026-07-28T00:00:00Z".into(),
        }]),
    };
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains(r#""hideImage":true"#));
    assert!(json.contains(r#""type":"remove""#));
    assert!(json.contains("돼지고기"));
}

#[test]
fn allergy_warning_carries_matched_dislikes_and_confirmation_flag() {
    let frame = OutboundFrame::AllergyWarning {
        content: "당근을 싫어하시는 것 같아요. 그래도 진행할까요?".into(),
        matched_dislikes: vec!["당근".into()],
        show_confirmation: true,
    };
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains(r#""type":"allergy_warning""#));
    assert!(json.contains(r#""show_confirmation":true"#));
    assert!(json.contains("당근"));
}

#[test]
fn error_frame_serializes() {
    let frame = OutboundFrame::error("내부 오류가 발생했습니다");
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains(r#""type":"error""#));
}

#[test]
fn history_turn_image_field_is_optional() {
    let turn = HistoryTurn {
        role: "assistant".into(),
        content: "레시피입니다".into(),
        image: None,
    };
    let json = serde_json::to_string(&turn).unwrap();
    assert!(!json.contains("image"));
}

#[test]
fn member_info_defaults_when_fields_absent() {
    let info: MemberInfo = serde_json::from_str("{}").unwrap();
    assert_eq!(info.member_id, None);
    assert!(info.allergies.is_empty());
}
