use stenhamra::c14n::{canonicalize, C14nMode};

const DOC: &str = r#"<?xml version="1.0"?>
<!DOCTYPE doc [<!ATTLIST e9 attr CDATA "default">]>
<!-- head -->
<doc xmlns:b="urn:b" xmlns:a="urn:a">
   <e1   />
   <e2 b:y="2" a:x="1" z='3'>text &amp; &lt;more&gt;</e2>
   <e3 xmlns="urn:d"><e4 xmlns=""/></e3>
   <?pi data?>
</doc>"#;

const MODES: [C14nMode; 6] = [
    C14nMode::Inclusive,
    C14nMode::InclusiveWithComments,
    C14nMode::Inclusive11,
    C14nMode::Inclusive11WithComments,
    C14nMode::Exclusive,
    C14nMode::ExclusiveWithComments,
];

#[test]
fn test_canonicalization_is_idempotent() {
    for mode in MODES {
        let once = canonicalize(DOC, mode, None, &[]).unwrap();
        let twice = canonicalize(std::str::from_utf8(&once).unwrap(), mode, None, &[]).unwrap();
        assert_eq!(once, twice, "{mode:?}");
    }
}

#[test]
fn test_inclusive_output() {
    let out = canonicalize(DOC, C14nMode::InclusiveWithComments, None, &[]).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "<!-- head -->\n<doc xmlns:a=\"urn:a\" xmlns:b=\"urn:b\">\n   <e1></e1>\n   <e2 z=\"3\" a:x=\"1\" b:y=\"2\">text &amp; &lt;more&gt;</e2>\n   <e3 xmlns=\"urn:d\"><e4 xmlns=\"\"></e4></e3>\n   <?pi data?>\n</doc>"
    );
}

#[test]
fn test_exclusive_drops_unused_namespaces() {
    let out = canonicalize(DOC, C14nMode::Exclusive, None, &[]).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("<doc>\n   <e1></e1>\n   <e2 xmlns:a=\"urn:a\" xmlns:b=\"urn:b\" z=\"3\" a:x=\"1\" b:y=\"2\">"));
}
