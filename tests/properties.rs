use attic_storefront as sf;
use proptest::prelude::*;

// Leading and trailing spaces are part of the value and must survive.
fn field() -> impl Strategy<Value = String> {
    " {0,2}[A-Za-z][A-Za-z0-9 ._-]{0,11}[A-Za-z0-9] {0,2}"
}

fn currency() -> impl Strategy<Value = Option<char>> {
    prop::option::of(prop::sample::select(vec!['$', '€', '£', '¥']))
}

fn record() -> impl Strategy<Value = sf::ItemRecord> {
    (field(), field(), field(), 0u32..100_000, currency(), field()).prop_map(
        |(name, color, category, price, currency, image_ref)| sf::ItemRecord {
            name,
            color,
            category,
            price,
            currency,
            image_ref,
        },
    )
}

#[test]
fn euro_line_survives_reload() {
    let line = "Lamp ,Red,Decor,€15,lamp.png";
    let catalog = sf::load_strict(line).unwrap();
    assert_eq!(catalog.to_text(), line);
}

proptest! {
    #[test]
    fn load_preserves_serialized_records(items in prop::collection::vec(record(), 0..20)) {
        let catalog = sf::Catalog::new(items.clone());
        let reloaded = sf::load(&catalog.to_text());
        prop_assert!(reloaded.rejected.is_empty());
        prop_assert_eq!(reloaded.catalog.items(), &items[..]);
    }

    #[test]
    fn price_sort_is_non_decreasing_and_stable(items in prop::collection::vec(record(), 0..30)) {
        let catalog = sf::Catalog::new(items);
        let sorted = sf::sort_by(&catalog, sf::SortField::Price);
        prop_assert_eq!(sorted.len(), catalog.len());
        for pair in sorted.items().windows(2) {
            prop_assert!(pair[0].price <= pair[1].price);
        }
        // Stability: among equal prices, the original order is kept.
        for price in sorted.iter().map(|i| i.price) {
            let from_input: Vec<_> = catalog.iter().filter(|i| i.price == price).collect();
            let from_sorted: Vec<_> = sorted.iter().filter(|i| i.price == price).collect();
            prop_assert_eq!(from_input, from_sorted);
        }
    }

    #[test]
    fn is_enabled_is_deterministic(user in "[a-z0-9]{1,16}", rollout in 0u32..=10_000) {
        let datafile = format!(
            r#"{{"featureFlags":[{{"key":"sorting_enabled","rolloutPercentage":{rollout},
                "variables":[{{"key":"welcome_message","type":"string","defaultValue":"hey"}}]}}]}}"#
        );
        let client = sf::FlagClient::from_datafile(&datafile).unwrap();
        let first = client.is_enabled("sorting_enabled", &user);
        for _ in 0..5 {
            prop_assert_eq!(client.is_enabled("sorting_enabled", &user), first);
        }
        let message = client.get_variable_string("sorting_enabled", "welcome_message", &user);
        if first {
            prop_assert_eq!(message.as_deref(), Some("hey"));
        } else {
            prop_assert_eq!(message, None);
        }
    }
}
