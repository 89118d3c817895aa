//! Cross-module scenarios: map, entities and components working together
