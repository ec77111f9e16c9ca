//! Behavioural tests for frame validators.

use optio::models::frame::{Direction, Frame, Payload};
use optio::validator::Validator;

fn frames() -> Vec<Frame> {
    [
        "Hello",
        "hello",
        "Hello World",
        "hi World",
        "Hey there",
        "Hello Bye",
        "",
        r#"451-["signals/load",{"_placeholder":true,"num":0}]"#,
        r#"42["changeSymbol",{"asset":"EURUSD_otc","period":1}]"#,
    ]
    .into_iter()
    .map(Frame::inbound_text)
    .collect()
}

fn validators() -> Vec<Validator> {
    vec![
        Validator::none(),
        Validator::regex(r"([A-Z])\w+").expect("valid pattern"),
        Validator::regex(r#"^451-\["signals/"#).expect("valid pattern"),
        Validator::starts_with("Hello"),
        Validator::ends_with("Bye"),
        Validator::contains("World"),
        Validator::not(Validator::contains("o")),
        Validator::all(vec![Validator::starts_with("42"), Validator::contains("EURUSD")]),
        Validator::any(vec![]),
    ]
}

#[test]
fn test_none_matches_every_frame() {
    for frame in frames() {
        assert!(Validator::none().evaluate(&frame), "{frame:?}");
    }
}

#[test]
fn test_not_negates() {
    for v in validators() {
        for frame in frames() {
            assert_eq!(
                Validator::not(v.clone()).evaluate(&frame),
                !v.evaluate(&frame),
                "{v:?} on {frame:?}"
            );
        }
    }
}

#[test]
fn test_all_and_any_follow_boolean_logic() {
    let vs = validators();
    for a in &vs {
        for b in &vs {
            let all = Validator::all(vec![a.clone(), b.clone()]);
            let any = Validator::any(vec![a.clone(), b.clone()]);
            for frame in frames() {
                let (x, y) = (a.evaluate(&frame), b.evaluate(&frame));
                assert_eq!(all.evaluate(&frame), x && y, "all({a:?}, {b:?}) on {frame:?}");
                assert_eq!(any.evaluate(&frame), x || y, "any({a:?}, {b:?}) on {frame:?}");
            }
        }
    }
}

#[test]
fn test_literal_scenarios() {
    let capitalized = Validator::regex(r"([A-Z])\w+").expect("valid pattern");
    assert!(capitalized.check("Hello"));
    assert!(!capitalized.check("hello"));

    let hello = Validator::starts_with("Hello");
    assert!(hello.check("Hello World"));
    assert!(!hello.check("hi World"));

    let both = Validator::all(vec![capitalized, hello]);
    assert!(both.check("Hello World"));
    assert!(!both.check("hello World"));
    assert!(!both.check("Hey there"));

    let either = Validator::any(vec![Validator::contains("World"), Validator::ends_with("Bye")]);
    assert!(either.check("Hello World"));
    assert!(either.check("Hello Bye"));
    assert!(!either.check("Hello there"));
}

#[test]
fn test_validators_are_shared_across_threads() {
    let validator = std::sync::Arc::new(Validator::all(vec![
        Validator::regex(r#""requestId":\d+"#).expect("valid pattern"),
        Validator::not(Validator::contains("error")),
    ]));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let validator = validator.clone();
            std::thread::spawn(move || {
                let frame = Frame::new(
                    Direction::Inbound,
                    "successopenOrder",
                    Payload::Binary(format!(r#"{{"requestId":{i}}}"#).into_bytes()),
                );
                validator.evaluate(&frame)
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("thread panicked"));
    }
}
