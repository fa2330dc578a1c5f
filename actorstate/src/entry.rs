use crate::{
    record::Record,
    session::{Entry, EntryState},
};

/// What a configurator sees of a pending save.
pub struct SaveEntryContext<'a, R> {
    pub entry: &'a mut Entry<R>,
    /// Result of the state's persisted check on the record being saved.
    pub is_persisted: bool,
}

/// Decides the disposition a record is saved with.
pub trait EntryConfigurator: Send + Sync + 'static {
    fn configure_save_entry<R: Record>(&self, cx: SaveEntryContext<'_, R>);
}

/// Updates persisted records and inserts the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEntryConfigurator;

impl EntryConfigurator for DefaultEntryConfigurator {
    fn configure_save_entry<R: Record>(&self, cx: SaveEntryContext<'_, R>) {
        cx.entry.state = if cx.is_persisted {
            EntryState::Modified
        } else {
            EntryState::Added
        };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::record::{Property, RecordModel};

    #[derive(Debug, Clone)]
    struct Note {
        id: i64,
    }

    impl Record for Note {
        fn model() -> &'static RecordModel<Self> {
            static MODEL: LazyLock<RecordModel<Note>> = LazyLock::new(|| {
                RecordModel::builder("Note")
                    .property(Property::new("id", |r: &Note| &r.id, |r| &mut r.id))
                    .build()
            });

            &MODEL
        }
    }

    #[test]
    fn test_default_disposition() {
        let mut entry = Entry::new(Note { id: 0 });
        DefaultEntryConfigurator.configure_save_entry(SaveEntryContext {
            entry: &mut entry,
            is_persisted: false,
        });
        assert_eq!(entry.state, EntryState::Added);

        let mut entry = Entry::new(Note { id: 5 });
        DefaultEntryConfigurator.configure_save_entry(SaveEntryContext {
            entry: &mut entry,
            is_persisted: true,
        });
        assert_eq!(entry.state, EntryState::Modified);
        assert_eq!(entry.record.id, 5);
    }
}
