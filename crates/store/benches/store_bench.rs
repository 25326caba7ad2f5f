use criterion::{Criterion, criterion_group, criterion_main};
use serde::{Deserialize, Serialize};
use store::{
    Document, DocumentQuery, DocumentStore, EntityId, InMemoryDocumentStore, Repository,
    WriteBatch,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Item {
    id: EntityId,
    name: String,
    price: i64,
    quantity: i64,
}

impl Document for Item {
    const COLLECTION: &'static str = "items";

    fn id(&self) -> EntityId {
        self.id
    }
}

fn item(n: i64) -> Item {
    Item {
        id: EntityId::new(),
        name: format!("item {n}"),
        price: n * 10,
        quantity: 100,
    }
}

fn bench_insert_single(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("store/insert_single", |b| {
        b.iter(|| {
            rt.block_on(async {
                let repo = Repository::<Item, _>::new(InMemoryDocumentStore::new());
                repo.insert(&item(1)).await.unwrap();
            });
        });
    });
}

fn bench_guarded_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryDocumentStore::new();
    let repo = Repository::<Item, _>::new(store.clone());
    let ids: Vec<EntityId> = rt.block_on(async {
        let mut ids = Vec::new();
        for n in 0..10 {
            let it = item(n);
            ids.push(it.id);
            repo.insert(&it).await.unwrap();
        }
        ids
    });

    c.bench_function("store/guarded_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let batch = ids.iter().fold(WriteBatch::new(), |batch, id| {
                    batch
                        .increment::<Item>(*id, "quantity", -1, Some(i64::MIN))
                        .increment::<Item>(*id, "sold", 1, None)
                });
                store.commit(batch).await.unwrap();
            });
        });
    });
}

fn bench_find_sorted_page(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryDocumentStore::new();
    let repo = Repository::<Item, _>::new(store);
    rt.block_on(async {
        for n in 0..1000 {
            repo.insert(&item(n)).await.unwrap();
        }
    });

    let query = DocumentQuery::new()
        .range("price", Some(1000.0), None)
        .sort_by("price", true)
        .offset(20)
        .limit(20);

    c.bench_function("store/find_sorted_page_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                repo.find(&query).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_insert_single,
    bench_guarded_batch,
    bench_find_sorted_page
);
criterion_main!(benches);
