//! The routectl config format codec (spec §4.1). Pure, stateless: no I/O.

mod emit;
mod parse;
mod tokenize;

pub use emit::emit;
pub use parse::parse;

#[cfg(test)]
mod roundtrip {
    use super::*;
    use proptest::prelude::*;
    use routectl_types::{ConfigDocument, Section};

    fn arb_token() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_-]{0,8}"
    }

    fn arb_value() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ._/]{0,12}"
    }

    fn arb_section() -> impl Strategy<Value = Section> {
        (
            arb_token(),
            proptest::option::of(arb_token()),
            proptest::collection::vec((arb_token(), arb_value()), 0..4),
            proptest::collection::vec((arb_token(), proptest::collection::vec(arb_value(), 0..3)), 0..3),
        )
            .prop_map(|(section_type, name, options, lists)| {
                let mut s = Section::new(section_type, name);
                for (k, v) in options {
                    s.set_option(k, v);
                }
                for (k, vs) in lists {
                    for v in vs {
                        s.push_list(k.clone(), v);
                    }
                }
                s
            })
    }

    fn arb_document() -> impl Strategy<Value = ConfigDocument> {
        proptest::collection::vec(arb_section(), 0..6).prop_map(|sections| ConfigDocument { sections })
    }

    proptest! {
        #[test]
        fn parse_of_emit_is_semantically_equal(doc in arb_document()) {
            let text = emit(&doc);
            let reparsed = parse(&text).expect("round-trip parse must succeed");
            prop_assert!(doc.semantically_eq(&reparsed));
        }
    }

    #[test]
    fn empty_document_round_trips() {
        let doc = ConfigDocument::new();
        let reparsed = parse(&emit(&doc)).expect("parse");
        assert!(doc.semantically_eq(&reparsed));
    }
}
