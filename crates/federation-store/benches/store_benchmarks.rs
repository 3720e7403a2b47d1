//! Benchmarks for federation-store operations.
//!
//! Run with: `cargo bench --package federation-store`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use federation_core::{LabelSelector, ServiceSet};
use federation_proto::fds::ExportedService;
use federation_store::{ExportStore, ImportedServiceStore, Service, ServiceCatalog, ServicePort};

fn populated_catalog(num_services: usize) -> Arc<ServiceCatalog> {
    let catalog = Arc::new(ServiceCatalog::with_capacity(num_services));
    for i in 0..num_services {
        let mut service = Service::new(format!("svc-{i}"), format!("ns-{}", i % 10))
            .with_label("app", format!("svc-{i}"))
            .with_port(ServicePort::new("http", 80));
        // Every fourth service is exported.
        if i % 4 == 0 {
            service = service.with_label("export", "true");
        }
        catalog.upsert(service);
    }
    catalog
}

fn bench_matching_services(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching_services");

    for num_services in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*num_services as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_services),
            num_services,
            |b, &num_services| {
                let store = ExportStore::new(
                    populated_catalog(num_services),
                    ServiceSet::from_selectors(vec![LabelSelector::from_labels([(
                        "export", "true",
                    )])]),
                );
                b.iter(|| black_box(store.matching_services()));
            },
        );
    }

    group.finish();
}

fn bench_import_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("import_get_all");

    for num_peers in [1, 4, 16].iter() {
        group.bench_with_input(
            BenchmarkId::new("peers", num_peers),
            num_peers,
            |b, &num_peers| {
                let store = ImportedServiceStore::new();
                for p in 0..num_peers {
                    let services = (0..100)
                        .map(|i| ExportedService {
                            name: format!("svc-{i}"),
                            namespace: "ns".to_string(),
                            ..Default::default()
                        })
                        .collect();
                    store.update(&format!("peer-{p}"), services);
                }
                b.iter(|| black_box(store.get_all()));
            },
        );
    }

    group.finish();
}

fn bench_catalog_upsert(c: &mut Criterion) {
    c.bench_function("catalog_upsert", |b| {
        let catalog = ServiceCatalog::new();
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            catalog.upsert(Service::new(format!("svc-{}", counter % 100), "ns"));
        });
    });
}

criterion_group!(
    benches,
    bench_matching_services,
    bench_import_merge,
    bench_catalog_upsert,
);

criterion_main!(benches);
