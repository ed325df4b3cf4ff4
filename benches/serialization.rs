//! Serialization benchmarks
//!
//! Measures referral encoding and decoding without network I/O.

use chrono::NaiveDate;
use clinic_referral::mapping;
use clinic_referral::patient::{Address, Gender, Patient};
use clinic_referral::protocol::header::ControlIdGenerator;
use clinic_referral::protocol::message::{ClinicalMessage, SegmentKind};
use clinic_referral::protocol::types::{build_referral, ReferralRequest};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sample_patient() -> Patient {
    let mut patient = Patient::new("P00001234", "mary", "o'brien", "mary@example.org");
    patient.birthdate = NaiveDate::from_ymd_opt(1975, 12, 31);
    patient.phone = Some("555-0100".to_string());
    patient.gender = Some(Gender::Female);
    patient.address = Some(Address {
        street: "12 Elm St".to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        zip: "62701".to_string(),
    });
    patient
}

fn bench_referral_encode(c: &mut Criterion) {
    let patient = sample_patient();
    let ids = ControlIdGenerator::new();

    c.bench_function("referral_build_encode", |b| {
        b.iter(|| {
            let request = ReferralRequest::new(&patient, "CLINIC_A", "CLINIC_B", &ids);
            let msg = build_referral(&patient, &request, "CLINIC_REFERRAL").unwrap();
            black_box(msg.encode().unwrap())
        });
    });
}

fn bench_referral_decode(c: &mut Criterion) {
    let patient = sample_patient();
    let request = ReferralRequest::new(&patient, "CLINIC_A", "CLINIC_B", &ControlIdGenerator::new());
    let encoded = build_referral(&patient, &request, "CLINIC_REFERRAL")
        .unwrap()
        .encode()
        .unwrap();

    c.bench_function("referral_decode_normalize", |b| {
        b.iter(|| {
            let msg = ClinicalMessage::decode(black_box(&encoded)).unwrap();
            let pid = msg.segment(&SegmentKind::Demographic).unwrap();
            black_box(mapping::to_domain(pid).unwrap())
        });
    });
}

criterion_group!(benches, bench_referral_encode, bench_referral_decode);

criterion_main!(benches);
