//! Streamed rendering and output buffering end to end.

use serde_json::json;
use weft::{Environment, UndefinedBehavior, WeftError};

fn fragments(stream: impl Iterator<Item = weft::Result<String>>) -> Vec<String> {
    stream.map(|item| item.unwrap()).collect()
}

#[test]
fn test_stream_defaults_to_raw_fragments() {
    let env = Environment::new();
    let template = env
        .from_string("a{{ x }}b{{ y }}", None, None)
        .unwrap();
    let stream = template.stream(json!({ "x": 1, "y": 2 })).unwrap();
    assert_eq!(fragments(stream), vec!["a", "1", "b", "2"]);
}

#[test]
fn test_streamed_concat_equals_render() {
    let env = Environment::new();
    let source = "{% for n in ns %}{{ n }},{% endfor %}done";
    let template = env.from_string(source, None, None).unwrap();
    let context = json!({ "ns": [1, 2, 3] });

    let rendered = template.render(context.clone()).unwrap();
    let mut stream = template.stream(context).unwrap();
    stream.enable_buffering(2).unwrap();
    let streamed: String = fragments(stream).concat();

    assert_eq!(streamed, rendered);
}

#[test]
fn test_buffering_groups_fragments() {
    let env = Environment::new();
    let template = env
        .from_string("a{{ x }}b{{ y }}c", None, None)
        .unwrap();
    let mut stream = template.stream(json!({ "x": 1, "y": 2 })).unwrap();
    stream.enable_buffering(2).unwrap();
    // Five fragments regroup into chunks of two with a short tail.
    assert_eq!(fragments(stream), vec!["a1", "b2", "c"]);
}

#[test]
fn test_buffering_skips_empty_fragments() {
    let env = Environment::new();
    // The lenient policy turns the missing name into an empty fragment,
    // which buffered mode swallows instead of counting.
    let template = env
        .from_string("a{{ missing }}b{{ missing }}c", None, None)
        .unwrap();
    let mut stream = template.stream(()).unwrap();
    stream.enable_buffering(2).unwrap();
    assert_eq!(fragments(stream), vec!["ab", "c"]);
}

#[test]
fn test_unbuffered_stream_keeps_empty_fragments() {
    let env = Environment::new();
    let template = env.from_string("a{{ missing }}b", None, None).unwrap();
    let stream = template.stream(()).unwrap();
    assert_eq!(fragments(stream), vec!["a", "", "b"]);
}

#[test]
fn test_rejected_buffer_sizes_leave_the_stream_usable() {
    let env = Environment::new();
    let template = env.from_string("a{{ x }}", None, None).unwrap();
    let mut stream = template.stream(json!({ "x": 9 })).unwrap();

    for size in [0, 1] {
        let err = stream.enable_buffering(size).unwrap_err();
        assert!(matches!(err, WeftError::Configuration(_)));
    }
    assert!(!stream.is_buffered());
    assert_eq!(fragments(stream), vec!["a", "9"]);
}

#[test]
fn test_buffering_reconfigures_between_chunks() {
    let env = Environment::new();
    let template = env
        .from_string("{% for n in ns %}{{ n }}{% endfor %}", None, None)
        .unwrap();
    let mut stream = template
        .stream(json!({ "ns": [1, 2, 3, 4, 5, 6] }))
        .unwrap();
    stream.enable_buffering(2).unwrap();
    assert_eq!(stream.next().unwrap().unwrap(), "12");
    stream.disable_buffering();
    assert_eq!(stream.next().unwrap().unwrap(), "3");
    stream.enable_buffering(3).unwrap();
    assert_eq!(stream.next().unwrap().unwrap(), "456");
    assert!(stream.next().is_none());
}

#[test]
fn test_stream_surfaces_render_errors() {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    let template = env.from_string("ok-{{ missing }}", None, None).unwrap();
    let mut stream = template.stream(()).unwrap();
    stream.enable_buffering(4).unwrap();
    let item = stream.next().unwrap();
    assert!(matches!(item, Err(WeftError::Undefined { .. })));
    assert!(stream.next().is_none());
}

#[test]
fn test_mid_stream_abort_keeps_delivered_output() {
    let env = Environment::new();
    let template = env
        .from_string("first{{ 1 // 0 }}never", None, None)
        .unwrap();
    let mut stream = template.stream(()).unwrap();
    // The consumer walks away after one fragment; what was handed out
    // stays valid and nothing further runs.
    let first = stream.next().unwrap().unwrap();
    assert_eq!(first, "first");
    drop(stream);
}

#[test]
fn test_exhausted_stream_stays_exhausted() {
    let env = Environment::new();
    let template = env.from_string("once", None, None).unwrap();
    let mut stream = template.stream(()).unwrap();
    assert_eq!(stream.next().unwrap().unwrap(), "once");
    assert!(stream.next().is_none());
    assert!(stream.next().is_none());
}
