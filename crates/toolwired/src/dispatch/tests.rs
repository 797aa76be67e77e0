//! Dispatcher behaviour over raw frames.

use std::sync::Arc;

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;

fn echo(params: &Params) -> Result<Value, HandlerError> {
    Ok(json!({ "text": params.get("text").cloned().unwrap_or(Value::Null) }))
}

#[fixture]
fn dispatcher() -> Dispatcher {
    let mut handlers = HandlerRegistry::new();
    handlers
        .register(
            "echo",
            ParamSchema::new().required("text", ValueKind::String),
            echo,
        )
        .expect("register echo");
    handlers
        .register("fail", ParamSchema::new(), |_: &Params| {
            Err(HandlerError::new("disk on fire"))
        })
        .expect("register fail");
    handlers
        .register("sum", ParamSchema::new().required("values", ValueKind::Array), |params: &Params| {
            let total: i64 = params
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(Value::as_i64).sum())
                .unwrap_or_default();
            Ok(json!(total))
        })
        .expect("register sum");
    Dispatcher::new(Arc::new(handlers))
}

fn encoded(response: &Response) -> Value {
    serde_json::to_value(response).expect("serialize response")
}

fn error_code(response: &Response) -> i64 {
    response.error().expect("error response").code
}

#[rstest]
fn echoes_text_with_matching_id(dispatcher: Dispatcher) {
    let response =
        dispatcher.dispatch(br#"{"jsonrpc":"2.0","id":1,"method":"echo","params":{"text":"hi"}}"#);
    assert_eq!(
        encoded(&response),
        json!({"jsonrpc": "2.0", "id": 1, "result": {"text": "hi"}})
    );
}

#[rstest]
#[case::number(json!(42))]
#[case::string(json!("req-9"))]
#[case::null(json!(null))]
fn echoes_the_request_id(dispatcher: Dispatcher, #[case] id: Value) {
    let frame = json!({"jsonrpc": "2.0", "id": id, "method": "echo", "params": {"text": "x"}});
    let response = dispatcher.dispatch(frame.to_string().as_bytes());
    assert_eq!(encoded(&response).get("id"), Some(&id));
}

#[rstest]
#[case::truncated(b"{\"jsonrpc\":".as_slice())]
#[case::garbage(b"not json at all".as_slice())]
#[case::trailing(b"{} {}".as_slice())]
fn malformed_json_is_a_parse_error(dispatcher: Dispatcher, #[case] frame: &[u8]) {
    let response = dispatcher.dispatch(frame);
    assert_eq!(error_code(&response), -32700);
    assert_eq!(response.id(), &RequestId::Null);
}

#[rstest]
fn unknown_method_names_the_method(dispatcher: Dispatcher) {
    let response = dispatcher.dispatch(br#"{"jsonrpc":"2.0","id":3,"method":"nope"}"#);
    let error = response.error().expect("error response");
    assert_eq!(error.code, -32601);
    assert!(error.message.contains("nope"));
    assert_eq!(response.id(), &RequestId::from(3));
}

#[rstest]
fn missing_method_is_method_not_found(dispatcher: Dispatcher) {
    let response = dispatcher.dispatch(br#"{"jsonrpc":"2.0","id":4}"#);
    assert_eq!(error_code(&response), -32601);
}

#[rstest]
#[case::no_version(br#"{"id":5,"method":"echo","params":{"text":"x"}}"#.as_slice())]
#[case::bad_version(br#"{"jsonrpc":"1.0","id":5,"method":"echo","params":{"text":"x"}}"#.as_slice())]
#[case::numeric_method(br#"{"jsonrpc":"2.0","id":5,"method":5}"#.as_slice())]
fn envelope_violations_are_invalid_requests(dispatcher: Dispatcher, #[case] frame: &[u8]) {
    let response = dispatcher.dispatch(frame);
    assert_eq!(error_code(&response), -32600);
    assert_eq!(response.id(), &RequestId::from(5));
}

#[rstest]
#[case::array(b"[1,2]".as_slice())]
#[case::scalar(b"17".as_slice())]
#[case::object_id(br#"{"jsonrpc":"2.0","id":{"a":1},"method":"echo"}"#.as_slice())]
fn unidentifiable_requests_get_a_null_id(dispatcher: Dispatcher, #[case] frame: &[u8]) {
    let response = dispatcher.dispatch(frame);
    assert_eq!(error_code(&response), -32600);
    assert_eq!(response.id(), &RequestId::Null);
}

#[rstest]
fn missing_required_parameter_is_invalid_params(dispatcher: Dispatcher) {
    let response = dispatcher.dispatch(br#"{"jsonrpc":"2.0","id":6,"method":"echo","params":{}}"#);
    let error = response.error().expect("error response");
    assert_eq!(error.code, -32602);
    assert!(error.message.contains("text"));
}

#[rstest]
#[case::wrong_type(br#"{"jsonrpc":"2.0","id":7,"method":"echo","params":{"text":12}}"#.as_slice())]
#[case::positional(br#"{"jsonrpc":"2.0","id":7,"method":"echo","params":["hi"]}"#.as_slice())]
#[case::array_expected(br#"{"jsonrpc":"2.0","id":7,"method":"sum","params":{"values":"1,2"}}"#.as_slice())]
fn mistyped_params_are_invalid_params(dispatcher: Dispatcher, #[case] frame: &[u8]) {
    let response = dispatcher.dispatch(frame);
    assert_eq!(error_code(&response), -32602);
    assert_eq!(response.id(), &RequestId::from(7));
}

#[rstest]
fn handler_failures_carry_the_handler_message(dispatcher: Dispatcher) {
    let response = dispatcher.dispatch(br#"{"jsonrpc":"2.0","id":8,"method":"fail"}"#);
    assert_eq!(
        encoded(&response),
        json!({
            "jsonrpc": "2.0",
            "id": 8,
            "error": {"code": -32000, "message": "disk on fire"}
        })
    );
}

#[rstest]
fn responses_never_carry_both_result_and_error(dispatcher: Dispatcher) {
    let frames: [&[u8]; 4] = [
        br#"{"jsonrpc":"2.0","id":1,"method":"echo","params":{"text":"a"}}"#,
        br#"{"jsonrpc":"2.0","id":2,"method":"fail"}"#,
        br#"{"jsonrpc":"2.0","id":3,"method":"sum","params":{"values":[1,2,3]}}"#,
        b"{",
    ];
    for frame in frames {
        let value = encoded(&dispatcher.dispatch(frame));
        let object = value.as_object().expect("response object");
        assert_eq!(object.get("jsonrpc"), Some(&json!("2.0")));
        assert!(object.contains_key("id"));
        assert_ne!(object.contains_key("result"), object.contains_key("error"));
    }
}

#[rstest]
fn handlers_see_validated_params(dispatcher: Dispatcher) {
    let response = dispatcher
        .dispatch(br#"{"jsonrpc":"2.0","id":9,"method":"sum","params":{"values":[4,5,6]}}"#);
    assert_eq!(response.result(), Some(&json!(15)));
}
