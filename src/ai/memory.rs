use std::collections::{HashMap, VecDeque};

/// Rolling buffer of recent decisions, rendered into prompts as few-shot context
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    name: String,
    capacity: usize,
    items: VecDeque<String>,
}

impl ConversationMemory {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append an entry, evicting the oldest once the buffer is full
    pub fn add(&mut self, item: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        let item = item.into();
        ::log::debug!(
            "Added to {} memory: {}",
            self.name,
            crate::utils::truncate_chars(&item, 50)
        );
        self.items.push_back(item);
    }

    /// Entries as a bulleted list, oldest first
    pub fn get_context(&self) -> String {
        if self.items.is_empty() {
            return "No previous context.".to_string();
        }
        self.items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.items.clear();
        ::log::debug!("Cleared {} memory", self.name);
    }
}

/// One memory per named context, created on first use
#[derive(Debug, Default)]
pub struct ContextManager {
    memories: HashMap<String, ConversationMemory>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory for `name`; `capacity` only applies when the memory is created
    pub fn get_memory(&mut self, name: &str, capacity: usize) -> &mut ConversationMemory {
        self.memories.entry(name.to_string()).or_insert_with(|| {
            ::log::debug!("Created new memory context: {}", name);
            ConversationMemory::new(name, capacity)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context() {
        let memory = ConversationMemory::new("page_analysis", 5);
        assert_eq!(memory.get_context(), "No previous context.");
    }

    #[test]
    fn test_keeps_last_n_in_order() {
        let mut memory = ConversationMemory::new("link_selection", 3);
        for i in 1..=7 {
            memory.add(format!("item {}", i));
        }
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.get_context(), "- item 5\n- item 6\n- item 7");
    }

    #[test]
    fn test_clear() {
        let mut memory = ConversationMemory::new("x", 2);
        memory.add("a");
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.get_context(), "No previous context.");
    }

    #[test]
    fn test_zero_capacity_stays_empty() {
        let mut memory = ConversationMemory::new("x", 0);
        memory.add("a");
        assert!(memory.is_empty());
    }

    #[test]
    fn test_context_manager_reuses_memories() {
        let mut manager = ContextManager::new();
        manager.get_memory("extraction", 3).add("first");
        // capacity is fixed at creation
        let memory = manager.get_memory("extraction", 10);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.name(), "extraction");
        assert!(manager.get_memory("other", 3).is_empty());
    }
}
