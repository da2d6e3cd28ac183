//! Benchmarks for permission evaluation and the request gate.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rolegate_core::rbac::{
    ActionType, Authorizer, NoopAuditSink, PermissionContext, PolicyEngine, ResourceData,
    ResourceType, RoleCatalog, RoleRegistry, StaticTokenVerifier, VerifiedClaims,
};

fn engine() -> PolicyEngine {
    PolicyEngine::new(Arc::new(RoleRegistry::with_defaults()))
}

fn bench_evaluate(c: &mut Criterion) {
    let engine = engine();
    let registry = engine.registry().clone();
    let mut group = c.benchmark_group("evaluate");

    for role in ["super_admin", "admin", "campaign_manager", "viewer"] {
        let claims =
            VerifiedClaims::new("u-1", "u1@example.com", role, "org-1").with_team("team-a");
        let user = registry.resolve_user(&claims);
        group.bench_with_input(BenchmarkId::new("unconditional", role), &user, |b, user| {
            b.iter(|| {
                engine.evaluate(
                    black_box(user),
                    black_box(ResourceType::Kols),
                    black_box(ActionType::Read),
                    None,
                )
            })
        });
    }

    let manager = registry.resolve_user(
        &VerifiedClaims::new("u-1", "u1@example.com", "campaign_manager", "org-1")
            .with_team("team-a"),
    );
    let context = PermissionContext::new()
        .with_resource_id("cmp-1")
        .with_resource_data(ResourceData::new().with("teamId", "team-a").with("createdBy", "u-2"));
    group.bench_function("team_condition", |b| {
        b.iter(|| {
            engine.evaluate(
                black_box(&manager),
                ResourceType::Campaigns,
                ActionType::Approve,
                Some(black_box(&context)),
            )
        })
    });

    group.finish();
}

fn bench_registry_build(c: &mut Criterion) {
    let rendered = RoleCatalog::defaults()
        .render(rolegate_core::rbac::CatalogFormat::Toml)
        .unwrap();

    c.bench_function("registry/from_toml", |b| {
        b.iter(|| {
            RoleCatalog::parse(black_box(&rendered), rolegate_core::rbac::CatalogFormat::Toml)
                .unwrap()
                .into_registry(Default::default(), "viewer")
                .unwrap()
        })
    });
}

fn bench_authorize(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let verifier = StaticTokenVerifier::new().with_credential(
        "bench-key",
        VerifiedClaims::new("u-1", "u1@example.com", "viewer", "org-1"),
    );
    let authorizer = Authorizer::new(
        Arc::new(RoleRegistry::with_defaults()),
        Arc::new(verifier),
        Arc::new(NoopAuditSink),
    );
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer bench-key"));

    c.bench_function("authorize/static_allow", |b| {
        b.to_async(&runtime).iter(|| async {
            authorizer
                .authorize(
                    &headers,
                    ResourceType::Campaigns,
                    ActionType::Read,
                    |identity| async move { identity.user_id.len() },
                )
                .await
                .unwrap()
        })
    });

    c.bench_function("authorize/static_deny", |b| {
        b.to_async(&runtime).iter(|| async {
            authorizer
                .authorize(&headers, ResourceType::Billing, ActionType::Manage, |_| async {})
                .await
                .unwrap_err()
        })
    });
}

criterion_group!(benches, bench_evaluate, bench_registry_build, bench_authorize);
criterion_main!(benches);
