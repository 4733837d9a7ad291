//! Measures validation and formatting of rule expressions against a
//! catalog of realistic size.

#![allow(missing_docs)]

use bomlogic::{Catalog, Formatter, Profile, Validator, VerticalStyle};
use criterion::{Criterion, criterion_group, criterion_main};

/// Builds a catalog of 50 features with 20 options each and 500 BOM codes.
fn catalog() -> Catalog {
    let mut catalog = Catalog::default();
    for feature in 1..=50 {
        let options: Vec<(String, String)> = (1..=20)
            .map(|option| {
                (
                    format!("K-{feature}-{option:06}"),
                    format!("Option {option} of feature {feature}"),
                )
            })
            .collect();
        catalog = catalog.with_feature(
            &format!("F{feature}"),
            &format!("Feature {feature}"),
            options.iter().map(|(k, d)| (k.as_str(), d.as_str())),
        );
    }
    for bom in 0..500 {
        catalog = catalog.with_bom(&format!("{}", 1_000_000 + bom), "Part");
    }
    catalog
}

/// A long static rule: `(K… AND K…) OR (K… AND K…) … → F…`.
fn long_rule() -> String {
    let alternatives: Vec<String> = (1..=25)
        .map(|feature| format!("(K-{feature}-000001 AND NOT K-{}-000002)", feature + 25))
        .collect();
    format!("{} → F7", alternatives.join(" OR "))
}

fn validate(c: &mut Criterion) {
    let catalog = catalog();
    let validator = Validator::new(Some(&catalog));
    let rule = long_rule();

    c.bench_function("validate static rule", |b| {
        b.iter(|| validator.validate_str(&rule, Profile::StaticRule).unwrap());
    });

    let dynamic = "if F3 == K-3-000004 AND K-9-000001 choose [K-12-000001, K-12-000002, K-12-000003]";
    c.bench_function("validate dynamic rule", |b| {
        b.iter(|| validator.validate_str(dynamic, Profile::DynamicRule).unwrap());
    });

    let tokens = validator.validate_str(&rule, Profile::StaticRule).unwrap();
    c.bench_function("expand features", |b| {
        b.iter(|| validator.expand_features(&tokens).unwrap());
    });
}

fn format(c: &mut Criterion) {
    let catalog = catalog();
    let formatter = Formatter::new(Some(&catalog));
    let rule = long_rule();

    c.bench_function("vertical with comments", |b| {
        b.iter(|| {
            formatter
                .to_vertical(&rule, VerticalStyle::Grouped, true)
                .unwrap()
        });
    });
}

criterion_group!(benches, validate, format);
criterion_main!(benches);
