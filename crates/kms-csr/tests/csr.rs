use std::str::FromStr;

use const_oid::db::rfc5912;
use kms_csr::keys::decode_spki_pem;
use kms_csr::{
    CertificateRequest, CsrBuilderFactory, KeyAlgorithm, KeyVersionName, KmsClient, KmsCsrError,
    KmsError, LocalKms, SignatureScheme,
};
use x509_cert::name::Name;

fn key_name(id: &str) -> KeyVersionName {
    KeyVersionName::new("acme", "europe-north1", "pki", id, "1").unwrap()
}

fn factory_with(keys: &[(&str, KeyAlgorithm)]) -> CsrBuilderFactory<LocalKms> {
    let kms = LocalKms::new();
    for (id, algorithm) in keys {
        kms.generate_key(key_name(id), *algorithm, id).unwrap();
    }
    CsrBuilderFactory::new(kms)
}

fn build(factory: &CsrBuilderFactory<LocalKms>, id: &str, subject: &str) -> CertificateRequest {
    factory
        .csr_builder()
        .with_key(key_name(id))
        .for_subject(subject)
        .unwrap()
        .build()
        .unwrap()
}

fn assert_round_trip(id: &str, algorithm: KeyAlgorithm, scheme: SignatureScheme) {
    let factory = factory_with(&[(id, algorithm)]);
    let request = build(&factory, id, "CN=device-01,O=Acme");

    request.verify().unwrap();
    assert_eq!(
        SignatureScheme::from_identifier(request.signature_algorithm()).unwrap(),
        scheme
    );

    // the embedded key is the one the KMS publishes for this version
    let kms = factory.key_cache().client();
    let published = decode_spki_pem(&kms.get_public_key_pem(&key_name(id)).unwrap()).unwrap();
    assert_eq!(request.public_key(), &published);
    assert_eq!(kms.calls().asymmetric_sign, 1);
}

// ── Round trips per algorithm ────────────────────────────────────────

#[test]
fn p256_request_verifies() {
    assert_round_trip("p256", KeyAlgorithm::EcSignP256Sha256, SignatureScheme::EcdsaSha256);
}

#[test]
fn p384_request_verifies() {
    assert_round_trip("p384", KeyAlgorithm::EcSignP384Sha384, SignatureScheme::EcdsaSha384);
}

#[test]
fn rsa_pkcs1_request_verifies() {
    assert_round_trip(
        "rsa-pkcs1",
        KeyAlgorithm::RsaSignPkcs1_2048Sha256,
        SignatureScheme::RsaPkcs1Sha256,
    );
}

#[test]
fn rsa_pss_request_verifies() {
    assert_round_trip(
        "rsa-pss",
        KeyAlgorithm::RsaSignPss2048Sha256,
        SignatureScheme::RsaPssSha256,
    );
}

const RSA_4096_PKCS8: &str = include_str!("data/rsa4096.pem");

#[test]
fn rsa_sha512_requests_verify() {
    let kms = LocalKms::new();
    let schemes = [
        ("rsa-pkcs1-sha512", KeyAlgorithm::RsaSignPkcs1_4096Sha512, SignatureScheme::RsaPkcs1Sha512),
        ("rsa-pss-sha512", KeyAlgorithm::RsaSignPss4096Sha512, SignatureScheme::RsaPssSha512),
    ];
    for (id, algorithm, _) in schemes {
        kms.import_pkcs8_pem(key_name(id), algorithm, RSA_4096_PKCS8).unwrap();
    }
    let factory = CsrBuilderFactory::new(kms);

    for (id, _, scheme) in schemes {
        let request = build(&factory, id, "CN=rsa.example");
        request.verify().unwrap();
        assert_eq!(
            SignatureScheme::from_identifier(request.signature_algorithm()).unwrap(),
            scheme
        );
    }
    assert_eq!(factory.key_cache().client().calls().asymmetric_sign, 2);
}

#[test]
fn signature_algorithm_oids() {
    let factory = factory_with(&[("p256", KeyAlgorithm::EcSignP256Sha256)]);
    let request = build(&factory, "p256", "CN=oid");
    assert_eq!(request.signature_algorithm().oid, rfc5912::ECDSA_WITH_SHA_256);
    assert!(request.signature_algorithm().parameters.is_none());
    assert_eq!(request.public_key().algorithm.oid, rfc5912::ID_EC_PUBLIC_KEY);
}

// ── Encoding ─────────────────────────────────────────────────────────

#[test]
fn pem_round_trip() {
    let factory = factory_with(&[("p256", KeyAlgorithm::EcSignP256Sha256)]);
    let request = build(&factory, "p256", "CN=pem.example");

    let pem = request.to_pem().unwrap();
    assert!(pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));

    let parsed = CertificateRequest::from_pem(&pem).unwrap();
    assert_eq!(parsed.to_der().unwrap(), request.to_der().unwrap());
    parsed.verify().unwrap();
}

#[test]
fn subject_is_preserved() {
    let factory = factory_with(&[("p256", KeyAlgorithm::EcSignP256Sha256)]);
    let subject = "CN=api.example.com,OU=Platform,O=Acme Corp,L=Stockholm,C=SE";
    let request = build(&factory, "p256", subject);

    assert_eq!(request.subject(), &Name::from_str(subject).unwrap());
    let parsed = CertificateRequest::from_der(&request.to_der().unwrap()).unwrap();
    assert_eq!(parsed.subject().to_string(), request.subject().to_string());
}

// ── Failures ─────────────────────────────────────────────────────────

#[test]
fn missing_fields_fail_without_remote_calls() {
    let factory = factory_with(&[("p256", KeyAlgorithm::EcSignP256Sha256)]);

    let error = factory
        .csr_builder()
        .for_subject("CN=nobody")
        .unwrap()
        .build()
        .unwrap_err();
    assert_eq!(error, KmsCsrError::MissingField("crypto key version name"));

    let error = factory
        .csr_builder()
        .with_key(key_name("p256"))
        .build()
        .unwrap_err();
    assert_eq!(error, KmsCsrError::MissingField("X500 principal"));

    assert_eq!(factory.key_cache().client().calls().total(), 0);
}

#[test]
fn secp256k1_key_is_rejected_before_signing() {
    let factory = factory_with(&[("k1", KeyAlgorithm::EcSignSecp256k1Sha256)]);

    let error = factory
        .csr_builder()
        .with_key(key_name("k1"))
        .for_subject("CN=k1")
        .unwrap()
        .build()
        .unwrap_err();

    assert_eq!(
        error,
        KmsCsrError::UnsupportedAlgorithm("EC_SIGN_SECP256K1_SHA256".to_string())
    );
    let calls = factory.key_cache().client().calls();
    assert_eq!(calls.get_key_metadata, 1);
    assert_eq!(calls.asymmetric_sign, 0);
}

#[test]
fn unknown_key_error_passes_through() {
    let factory = factory_with(&[]);

    let error = factory
        .csr_builder()
        .with_key(key_name("ghost"))
        .for_subject("CN=ghost")
        .unwrap()
        .build()
        .unwrap_err();

    assert_eq!(
        error,
        KmsCsrError::Kms(KmsError::NotFound(key_name("ghost").to_string()))
    );
}

// ── Caching across builds ────────────────────────────────────────────

#[test]
fn repeated_builds_reuse_key_metadata() {
    let factory = factory_with(&[("p256", KeyAlgorithm::EcSignP256Sha256)]);

    for i in 0..3 {
        build(&factory, "p256", &format!("CN=host-{i}")).verify().unwrap();
    }

    let calls = factory.key_cache().client().calls();
    assert_eq!(calls.get_key_metadata, 1);
    assert_eq!(calls.get_public_key_pem, 1);
    assert_eq!(calls.asymmetric_sign, 3);
}
