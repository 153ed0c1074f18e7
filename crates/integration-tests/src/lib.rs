// Integration test crate: all content lives under tests/.
