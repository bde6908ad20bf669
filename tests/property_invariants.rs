mod common;

use proptest::prelude::*;

use slicelabel::{
    annotation::{Annotation, AnnotationPatch},
    core::{history::HistoryConfig, store::AnnotationStore},
    geometry,
    persist::memory::MemoryBackend,
    types::{BrushOp, Segmentation},
};

use common::{draft, square};

#[derive(Debug, Clone)]
enum Action {
    Create { x: u8, y: u8, size: u8, class: u8 },
    Relabel { target: u8, class: u8 },
    Delete { target: u8 },
    Merge { a: u8, b: u8 },
    Brush { target: u8, x: u8, y: u8, add: bool },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (0u8..60, 0u8..60, 2u8..20, 1u8..4)
            .prop_map(|(x, y, size, class)| Action::Create { x, y, size, class }),
        1 => (0u8..16, 1u8..4).prop_map(|(target, class)| Action::Relabel { target, class }),
        1 => (0u8..16).prop_map(|target| Action::Delete { target }),
        1 => (0u8..16, 0u8..16).prop_map(|(a, b)| Action::Merge { a, b }),
        1 => (0u8..16, 0u8..80, 0u8..80, any::<bool>())
            .prop_map(|(target, x, y, add)| Action::Brush { target, x, y, add }),
    ]
}

fn pick(store: &AnnotationStore<MemoryBackend>, target: u8) -> Option<String> {
    let anns = store.annotations();
    (!anns.is_empty()).then(|| anns[usize::from(target) % anns.len()].id.clone())
}

async fn apply(store: &mut AnnotationStore<MemoryBackend>, action: Action) {
    match action {
        Action::Create { x, y, size, class } => {
            let seg = square(f64::from(x), f64::from(y), f64::from(size));
            store
                .create(draft(u32::from(class), &format!("c{class}"), seg))
                .await
                .unwrap();
        }
        Action::Relabel { target, class } => {
            if let Some(id) = pick(store, target) {
                let patch = AnnotationPatch::relabel(u32::from(class), format!("c{class}"));
                store.update(&id, patch).await.unwrap();
            }
        }
        Action::Delete { target } => {
            if let Some(id) = pick(store, target) {
                store.delete(&id).await.unwrap();
            }
        }
        Action::Merge { a, b } => {
            let (Some(a), Some(b)) = (pick(store, a), pick(store, b)) else {
                return;
            };
            if a != b {
                store.merge(&[a, b], 9, "merged").await.unwrap();
            }
        }
        Action::Brush { target, x, y, add } => {
            if let Some(id) = pick(store, target) {
                let op = if add { BrushOp::Add } else { BrushOp::Remove };
                store
                    .apply_brush(&id, &[(f64::from(x), f64::from(y))], 4.0, op)
                    .await
                    .unwrap();
            }
        }
    }
}

fn same_multiset(left: &[Annotation], right: &[Annotation]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut unmatched: Vec<&Annotation> = right.iter().collect();
    for ann in left {
        match unmatched.iter().position(|other| other.same_content(ann)) {
            Some(i) => {
                unmatched.swap_remove(i);
            }
            None => return false,
        }
    }
    true
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn rect() -> impl Strategy<Value = Segmentation> {
    (0u8..40, 0u8..40, 1u8..30, 1u8..30).prop_map(|(x, y, w, h)| {
        let (x, y, w, h) = (f64::from(x), f64::from(y), f64::from(w), f64::from(h));
        vec![vec![x, y, x + w, y, x + w, y + h, x, y + h]]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn undo_everything_returns_to_empty_and_redo_restores(
        actions in prop::collection::vec(action_strategy(), 1..30)
    ) {
        runtime().block_on(async {
            let mut store = AnnotationStore::new(MemoryBackend::new());
            store.load("img").await.unwrap();

            for action in actions {
                apply(&mut store, action).await;
                for ann in store.annotations() {
                    let shape = slicelabel::annotation::Shape::from_segmentation(ann.segmentation.clone());
                    prop_assert!((shape.area - ann.area).abs() < 1e-6);
                    prop_assert_eq!(shape.bbox, ann.bbox);
                }
            }
            let target = store.annotations().to_vec();

            while store.undo().await.unwrap() {}
            prop_assert!(store.annotations().is_empty());
            prop_assert!(store.backend().is_empty().await);
            prop_assert!(!store.can_undo());

            while store.redo().await.unwrap() {}
            prop_assert!(same_multiset(store.annotations(), &target));
            prop_assert_eq!(store.backend().len().await, target.len());
            prop_assert!(!store.can_redo());
            Ok(())
        })?;
    }

    #[test]
    fn undo_depth_never_exceeds_bound(
        depth in 1usize..8,
        actions in prop::collection::vec(action_strategy(), 1..20)
    ) {
        runtime().block_on(async {
            let mut store = AnnotationStore::with_history(
                MemoryBackend::new(),
                HistoryConfig { max_depth: depth },
            );
            store.load("img").await.unwrap();
            for action in actions {
                apply(&mut store, action).await;
                prop_assert!(store.history().undo_len() <= depth);
            }
            Ok(())
        })?;
    }

    #[test]
    fn union_area_is_bounded_by_inputs(a in rect(), b in rect()) {
        let (area_a, area_b) = (geometry::area(&a), geometry::area(&b));
        let u = geometry::area(&geometry::union(&a, &b));
        prop_assert!(u + 1e-6 >= area_a.max(area_b));
        prop_assert!(u <= area_a + area_b + 1e-6);
    }

    #[test]
    fn difference_never_grows(a in rect(), b in rect()) {
        let d = geometry::area(&geometry::difference(&a, &b));
        prop_assert!(d <= geometry::area(&a) + 1e-6);
        let u = geometry::area(&geometry::union(&a, &b));
        prop_assert!((d + geometry::area(&b) - u).abs() < 1e-6);
    }

    #[test]
    fn area_ignores_winding(a in rect()) {
        let reversed: Segmentation = a
            .iter()
            .map(|ring| ring.chunks_exact(2).rev().flatten().copied().collect())
            .collect();
        prop_assert!((geometry::area(&a) - geometry::area(&reversed)).abs() < 1e-9);
        prop_assert_eq!(geometry::bounding_box(&a), geometry::bounding_box(&reversed));
    }
}
