mod common;

use common::{TestFixtures, fast_policy, local_validator};
use strict_xml::{
    BundleLocator, Config, ErrorKind, FetchError, StrictValidator, StrictXml, ValidationError,
    XmlDocument, XsdSchema,
};

#[test]
fn test_discovered_schema_matches_explicit_schema() {
    let fixtures = TestFixtures::new();
    let explicit = XsdSchema::from_path(fixtures.payment_schema()).unwrap();
    let validator = local_validator();

    for (name, expect_valid) in [("payment_valid.xml", true), ("payment_invalid.xml", false)] {
        let doc = XmlDocument::from_path(fixtures.xml(name)).unwrap();

        let with_schema = validator.validate(&doc, &explicit).map(|_| ());
        let discovered = validator.validate_discovered(&doc).map(|_| ());

        assert_eq!(with_schema.is_ok(), expect_valid, "{}", name);
        assert_eq!(discovered.is_ok(), expect_valid, "{}", name);
        if let (Err(a), Err(b)) = (&with_schema, &discovered) {
            assert_eq!(a.kind(), b.kind());
            assert_eq!(a.violations(), b.violations());
        }
    }
}

#[test]
fn test_discovered_schema_is_cached() {
    let fixtures = TestFixtures::new();
    let validator = local_validator();
    let doc = XmlDocument::from_path(fixtures.xml("payment_valid.xml")).unwrap();

    validator.validate_discovered(&doc).unwrap();
    validator.validate_discovered(&doc).unwrap();
    assert_eq!(validator.resolver().cache().entry_count(), 1);
}

#[test]
fn test_relative_hint_resolves_from_resource_roots() {
    let fixtures = TestFixtures::new();
    let doc = XmlDocument::from_path(fixtures.xml("quantity_resource.xml")).unwrap();

    let validated = local_validator().validate_discovered(&doc).unwrap();
    assert_eq!(validated.root_name(), "quantity");
}

#[test]
fn test_hint_without_base_resolves_from_bundle() {
    let fixtures = TestFixtures::new();
    let mut config = Config::default();
    config.network.allow_remote = false;
    let bundle = BundleLocator::new().with_resource(
        "schemas/quantity.xsd",
        std::fs::read(fixtures.quantity_schema()).unwrap(),
    );
    let validator = StrictValidator::from_config_with_bundle(&config, bundle)
        .unwrap()
        .with_policy(fast_policy(3));

    let valid = XmlDocument::parse(
        r#"<quantity xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="schemas/quantity.xsd">100</quantity>"#,
    )
    .unwrap();
    assert!(validator.validate_discovered(&valid).is_ok());

    let invalid = XmlDocument::parse(
        r#"<quantity xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="schemas/quantity.xsd">101</quantity>"#,
    )
    .unwrap();
    let error = validator.validate_discovered(&invalid).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ContentInvalid);
}

#[test]
fn test_unresolvable_hint_is_distinct_from_invalid_content() {
    let fixtures = TestFixtures::new();
    let doc = XmlDocument::from_path(fixtures.xml("payment_missing_schema.xml")).unwrap();

    let error = local_validator().validate_discovered(&doc).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::SchemaLocationMalformed);
    assert_ne!(error.kind(), ErrorKind::ContentInvalid);
    assert!(!error.all_transient());
    match error {
        ValidationError::SchemaUnresolvable {
            attempted,
            failures,
        } => {
            assert_eq!(attempted, vec!["../schemas/does-not-exist.xsd"]);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].locator, "uri");
            assert!(!failures[0].error.is_transient());
        }
        other => panic!("Expected SchemaUnresolvable, got {:?}", other),
    }
}

#[test]
fn test_document_without_hint_needs_explicit_schema() {
    let fixtures = TestFixtures::new();
    let doc = XmlDocument::from_path(fixtures.xml("payment_no_hint.xml")).unwrap();

    let error = local_validator().validate_discovered(&doc).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::SchemaLocationMissing);

    let bare = XmlDocument::parse("<a></a>").unwrap();
    let error = StrictXml::with_validator(bare, &local_validator(), None).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::SchemaLocationMissing);
}

#[test]
fn test_odd_token_count_is_malformed_reference() {
    let doc = XmlDocument::parse(
        r#"<payment xmlns="urn:example:payment" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="urn:example:payment payment.xsd urn:dangling"/>"#,
    )
    .unwrap();

    let error = local_validator().validate_discovered(&doc).unwrap_err();
    assert!(matches!(
        error,
        ValidationError::SchemaLocationMalformed { .. }
    ));
}

#[test]
fn test_hinted_schema_that_does_not_compile() {
    let fixtures = TestFixtures::new();
    let doc = XmlDocument::from_path(fixtures.xml("broken_schema.xml")).unwrap();

    let error = local_validator().validate_discovered(&doc).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::SchemaLocationMalformed);
    assert!(matches!(error, ValidationError::SchemaUncompilable { .. }));
}

#[test]
fn test_strict_xml_with_discovered_schema() {
    let fixtures = TestFixtures::new();
    let doc = XmlDocument::from_path(fixtures.xml("payment_valid.xml")).unwrap();

    let strict = StrictXml::with_validator(doc, &local_validator(), None).unwrap();
    assert!(
        strict
            .base()
            .is_some_and(|base| base.path().ends_with("payment_valid.xml"))
    );
}

#[test]
fn test_unreachable_remote_hint_is_transient() {
    let mut config = Config::default();
    config.network.timeout_seconds = 2;
    config.network.retry_attempts = 0;
    config.network.retry_delay_ms = 1;
    config.network.max_retry_delay_ms = 1;
    let validator = StrictValidator::from_config(&config)
        .unwrap()
        .with_policy(fast_policy(1));

    let doc = XmlDocument::parse(
        r#"<quantity xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="http://127.0.0.1:1/x.xsd">5</quantity>"#,
    )
    .unwrap();

    let error = validator.validate_discovered(&doc).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::SchemaLocationMalformed);
    assert!(error.all_transient());
    match error {
        ValidationError::SchemaUnresolvable { failures, .. } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].location, "http://127.0.0.1:1/x.xsd");
            assert!(matches!(
                failures[0].error,
                FetchError::Transport(_) | FetchError::Timeout { .. }
            ));
        }
        other => panic!("Expected SchemaUnresolvable, got {:?}", other),
    }
}

#[test]
fn test_hinted_schema_with_unreachable_import() {
    let fixtures = TestFixtures::new();
    let doc = XmlDocument::from_path(fixtures.xml("remote_import.xml")).unwrap();
    let validator = local_validator();

    let error = validator.validate_discovered(&doc).unwrap_err();

    // A network failure inside the schema is not a broken reference
    assert_eq!(error.kind(), ErrorKind::ValidationUnavailable);
    assert!(error.is_environmental());
    assert!(matches!(
        error,
        ValidationError::ValidationUnavailable { attempts: 3, .. }
    ));
    assert_eq!(validator.resolver().cache().entry_count(), 0);
}

#[test]
fn test_discover_with_loaded_configuration() {
    let fixtures = TestFixtures::new();
    let doc = XmlDocument::from_path(fixtures.xml("payment_valid.xml")).unwrap();

    let strict = StrictXml::discover(doc).unwrap();
    assert_eq!(strict.root_name(), "payment");
}
