mod common;

use common::*;
use stenhamra::crypto::VerifyingKey;
use stenhamra::keys::{Key, KeySource};
use stenhamra::{
    verify, verify_with_report, DsigContext, IndeterminateReason, OfflineResolver,
    ReferenceStatus, VerifyResult,
};

#[test]
fn test_enveloped_signature_with_certificate_chain() {
    let xml = enveloped_document();
    let report = verify_with_report(&DsigContext::new(), &xml).unwrap();
    assert_eq!(report.result, VerifyResult::Valid);
    assert_eq!(report.key_source, Some(KeySource::X509Certificate));
    assert_eq!(report.key_name.as_deref(), Some("signer"));
}

#[test]
fn test_comments_are_not_signed() {
    let xml = enveloped_document().replace("<!-- note -->", "<!-- changed -->");
    assert_eq!(verify(&DsigContext::new(), &xml).unwrap(), VerifyResult::Valid);
}

#[test]
fn test_tampered_content_is_invalid() {
    let xml = enveloped_document().replace(">100<", ">900<");
    let report = verify_with_report(&DsigContext::new(), &xml).unwrap();
    assert!(matches!(report.result, VerifyResult::Invalid { .. }));
    assert_eq!(report.references[0].status, ReferenceStatus::DigestMismatch);
}

#[test]
fn test_tampered_signed_info_is_invalid() {
    let xml = enveloped_document().replace(
        "<ds:Reference URI=\"\">",
        "<ds:Reference URI=\"\" Id=\"added\">",
    );
    let report = verify_with_report(&DsigContext::new(), &xml).unwrap();
    assert!(report.references.iter().all(|r| r.is_valid()));
    assert_eq!(report.signature_value_valid, Some(false));
    assert!(!report.result.is_valid());
}

#[test]
fn test_tampered_signature_value_is_invalid() {
    let xml = enveloped_document();
    let start = xml.find("<ds:SignatureValue>").unwrap() + "<ds:SignatureValue>".len();
    let mut bytes = xml.into_bytes();
    bytes[start] = if bytes[start] == b'A' { b'B' } else { b'A' };
    let xml = String::from_utf8(bytes).unwrap();
    assert!(!verify(&DsigContext::new(), &xml).unwrap().is_valid());
}

#[test]
fn test_no_key_is_indeterminate() {
    let content = "<doc><a>1</a></doc>";
    let digest = sha256_b64(b"<doc><a>1</a></doc>");
    let sig = signature_template(&reference("", enveloped(), &digest), "");
    let xml = sign_rsa(&content.replace("</doc>", &format!("{sig}</doc>")));
    assert_eq!(
        verify(&DsigContext::new(), &xml).unwrap(),
        VerifyResult::Indeterminate(IndeterminateReason::NoKey)
    );

    let mut ctx = DsigContext::new();
    ctx.set_external_key(stenhamra::keys::loader::load_pem(RSA_KEY_PEM.as_bytes()).unwrap());
    assert_eq!(verify(&ctx, &xml).unwrap(), VerifyResult::Valid);
}

#[test]
fn test_malformed_certificate_is_indeterminate() {
    let xml = enveloped_document();
    let leaf = b64(RSA_CERT_DER);
    let corrupt = xml.replace(&leaf, "MIIBAAAA");
    let result = verify(&DsigContext::new(), &corrupt).unwrap();
    assert!(matches!(
        result,
        VerifyResult::Indeterminate(IndeterminateReason::CorruptKeyInfo(_))
    ));
}

#[test]
fn test_external_key_wins_over_key_info() {
    let xml = enveloped_document();
    let mut ctx = DsigContext::new();
    ctx.set_external_key(stenhamra::keys::loader::load_hmac_key(b"not the signer"));
    let report = verify_with_report(&ctx, &xml).unwrap();
    assert_eq!(report.key_source, Some(KeySource::External));
    assert!(matches!(
        &report.result,
        VerifyResult::Invalid { reason } if reason.starts_with("signature value rejected")
    ));
    assert_eq!(report.signature_value_valid, Some(false));
    assert!(report.references.iter().all(|r| r.is_valid()));
}

#[test]
fn test_malformed_ecdsa_signature_value_is_invalid() {
    let content = "<doc><a>1</a></doc>";
    let digest = sha256_b64(content.as_bytes());
    let sig = signature_template(&reference("", enveloped(), &digest), "")
        .replace(
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256",
        )
        .replace("@SIG@", "AAAA");
    let xml = content.replace("</doc>", &format!("{sig}</doc>"));

    let signing_key = p256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
    let mut ctx = DsigContext::new();
    ctx.set_external_key(Key::new(
        VerifyingKey::EcP256(*signing_key.verifying_key()),
        KeySource::External,
    ));

    let report = verify_with_report(&ctx, &xml).unwrap();
    assert!(matches!(report.result, VerifyResult::Invalid { .. }));
    assert_eq!(report.signature_value_valid, Some(false));
    assert_eq!(report.references.len(), 1);
    assert!(report.references[0].is_valid());
}

#[test]
fn test_certificate_precedence_over_key_value() {
    let content = "<doc><a>1</a></doc>";
    let digest = sha256_b64(b"<doc><a>1</a></doc>");
    let key_info = format!(
        "<ds:KeyInfo>{OTHER_RSA_KEY_VALUE}<ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
        b64(RSA_CERT_DER)
    );
    let sig = signature_template(&reference("", enveloped(), &digest), &key_info);
    let xml = sign_rsa(&content.replace("</doc>", &format!("{sig}</doc>")));

    let mut ctx = DsigContext::new();
    assert_eq!(verify(&ctx, &xml).unwrap(), VerifyResult::Valid);

    ctx.prefer_certificate_over_key = false;
    let report = verify_with_report(&ctx, &xml).unwrap();
    assert_eq!(report.key_source, Some(KeySource::KeyValue));
    assert_eq!(
        report.result,
        VerifyResult::Invalid {
            reason: "signature value verification failed".into()
        }
    );
}

#[test]
fn test_detached_reference_through_offline_resolver() {
    let payload = b"<catalog><item>lamp</item></catalog>".to_vec();
    let uri = "http://example.com/catalog.xml";
    let sig = signature_template(&reference(uri, "", &sha256_b64(&payload)), &key_info_with_chain());
    let xml = sign_rsa(&sig);

    let mut ctx = DsigContext::new();
    let report = verify_with_report(&ctx, &xml).unwrap();
    assert!(matches!(
        report.references[0].status,
        ReferenceStatus::ResolutionFailed(_)
    ));
    assert!(!report.result.is_valid());

    let mut offline = OfflineResolver::new();
    offline.add(uri, payload.clone());
    ctx.add_resolver(Box::new(offline));
    assert_eq!(verify(&ctx, &xml).unwrap(), VerifyResult::Valid);

    let mut tampered_ctx = DsigContext::new();
    let mut offline = OfflineResolver::new();
    offline.add(uri, b"<catalog><item>lamb</item></catalog>".to_vec());
    tampered_ctx.add_resolver(Box::new(offline));
    assert!(!verify(&tampered_ctx, &xml).unwrap().is_valid());
}

#[test]
fn test_resolver_order_decides() {
    let uri = "urn:example:data";
    let sig = signature_template(&reference(uri, "", &sha256_b64(b"right")), &key_info_with_chain());
    let xml = sign_rsa(&sig);

    let resolver = |data: &[u8]| {
        let mut offline = OfflineResolver::new();
        offline.add(uri, data.to_vec());
        Box::new(offline)
    };

    let mut ctx = DsigContext::new();
    ctx.add_resolver(resolver(b"right"));
    ctx.add_resolver(resolver(b"wrong"));
    assert_eq!(verify(&ctx, &xml).unwrap(), VerifyResult::Valid);

    let mut ctx = DsigContext::new();
    ctx.add_resolver(resolver(b"wrong"));
    ctx.add_resolver(resolver(b"right"));
    assert!(!verify(&ctx, &xml).unwrap().is_valid());
}

#[test]
fn test_external_manifest() {
    let data_uri = "urn:example:data";
    let manifest_uri = "urn:example:manifest";
    let manifest = |data_digest: &str| {
        format!(
            r#"<ds:Manifest xmlns:ds="{DSIG_NS}">{}</ds:Manifest>"#,
            reference(data_uri, "", data_digest)
        )
    };
    let good = manifest(&sha256_b64(b"data"));
    let bad = manifest(&sha256_b64(b"other data"));

    let signed = |manifest: &str| {
        let r = reference(manifest_uri, "", &sha256_b64(manifest.as_bytes()))
            .replace("<ds:Reference ", &format!("<ds:Reference Type=\"{MANIFEST_TYPE}\" "));
        sign_rsa(&signature_template(&r, &key_info_with_chain()))
    };

    for (manifest, inner_ok) in [(&good, true), (&bad, false)] {
        let xml = signed(manifest);
        let mut ctx = DsigContext::new();
        let mut offline = OfflineResolver::new();
        offline.add(manifest_uri, manifest.as_bytes().to_vec());
        offline.add(data_uri, b"data".to_vec());
        ctx.add_resolver(Box::new(offline));

        assert_eq!(verify(&ctx, &xml).unwrap(), VerifyResult::Valid);

        ctx.follow_nested_manifests = true;
        let report = verify_with_report(&ctx, &xml).unwrap();
        assert_eq!(report.result.is_valid(), inner_ok);
        assert_eq!(report.references[0].manifest.len(), 1);
        assert_eq!(report.references[0].manifest[0].is_valid(), inner_ok);
    }
}

#[test]
fn test_file_reference_relative_to_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("payload.bin"), b"\x00binary\xff").unwrap();
    let sig = signature_template(
        &reference("payload.bin", "", &sha256_b64(b"\x00binary\xff")),
        &key_info_with_chain(),
    );
    let xml = sign_rsa(&sig);

    let mut ctx = DsigContext::new();
    ctx.add_resolver(Box::new(stenhamra::FileResolver::new()));
    ctx.base_dir = Some(dir.path().to_path_buf());
    assert_eq!(verify(&ctx, &xml).unwrap(), VerifyResult::Valid);

    ctx.base_dir = None;
    assert!(!verify(&ctx, &xml).unwrap().is_valid());
}

#[test]
fn test_cancelled_resolution_fails_reference() {
    let uri = "urn:example:data";
    let sig = signature_template(&reference(uri, "", &sha256_b64(b"x")), &key_info_with_chain());
    let xml = sign_rsa(&sig);

    let mut ctx = DsigContext::new();
    let mut offline = OfflineResolver::new();
    offline.add(uri, b"x".to_vec());
    ctx.add_resolver(Box::new(offline));
    ctx.set_cancel_flag(std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)));
    let report = verify_with_report(&ctx, &xml).unwrap();
    assert_eq!(
        report.references[0].status,
        ReferenceStatus::ResolutionFailed("resource resolution failed: cancelled".into())
    );
}
