//! Scheduler connection.
//!
//! Owns everything shared by the rowsets of one scheduler: the
//! compatibility context for the connected server version, the rowset
//! dispatch table, the event dispatcher and the notification channel.

use crate::keepalive::{touch_registered, KeepAlive};
use hpcview_compat::{ConverterRegistry, PropertyCompatibility};
use hpcview_core::config::{ClientConfig, TransportKind};
use hpcview_core::error::HpcViewResult;
use hpcview_core::filter::FilterProperty;
use hpcview_core::query::RowSetType;
use hpcview_core::row::PropertyRow;
use hpcview_core::value::ObjectType;
use hpcview_core::version::ServerVersion;
use hpcview_notify::{
    ChannelSettings, ChannelState, Controller, EventDispatcher, NotificationChannel,
    RemoteControlService, SubscriptionId,
};
use hpcview_rowset::{EntityConfig, LocalRowset, RemoteRowsetService, RowsetContext, RowsetRegistry};
use hpcview_wire::{EntityKind, ObjectEvent, PacketDecoder};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

pub struct SchedulerConnection {
    config: ClientConfig,
    version: ServerVersion,
    ctx: RowsetContext,
    dispatcher: Arc<EventDispatcher>,
    channel: NotificationChannel,
    keep_alive: Mutex<Option<KeepAlive>>,
    rowsets: Mutex<Vec<Weak<LocalRowset>>>,
    closed: AtomicBool,
}

impl fmt::Debug for SchedulerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConnection")
            .field("scheduler", &self.config.scheduler)
            .field("version", &self.version)
            .field("channel", &self.channel)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SchedulerConnection {
    /// Connect to the scheduler named in `config`.
    ///
    /// Queries the server version first; property compatibility for every
    /// rowset opened through this connection follows from it. The
    /// notification channel starts in the background and this call does not
    /// wait for its handshake.
    pub fn connect(
        config: ClientConfig,
        service: Arc<dyn RemoteRowsetService>,
        control: Arc<dyn RemoteControlService>,
    ) -> HpcViewResult<Self> {
        config.validate()?;
        let version = control.server_version()?;
        let compat = Arc::new(ConverterRegistry::standard().for_version(version));
        info!(scheduler = %config.scheduler, %version, "connecting to scheduler");

        let registry = Arc::new(RowsetRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&control),
        ));

        let mut settings = ChannelSettings::from_config(&config.scheduler, &config.notification);
        if config.notification.transport == TransportKind::Poll {
            settings = settings.with_poll_connection_id(control.register_poll_client()?);
        }
        let channel = NotificationChannel::start(
            settings,
            Arc::clone(&dispatcher) as Arc<dyn Controller>,
            PacketDecoder::well_known(),
        )?;

        let ctx = RowsetContext::new(Arc::clone(&service), compat, Arc::clone(&registry))
            .with_page_size(config.rowset.page_size);
        let keep_alive = KeepAlive::start(config.rowset.keep_alive_interval(), service, registry)?;

        Ok(Self {
            config,
            version,
            ctx,
            dispatcher,
            channel,
            keep_alive: Mutex::new(Some(keep_alive)),
            rowsets: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn server_version(&self) -> ServerVersion {
        self.version
    }

    pub fn compat(&self) -> &Arc<PropertyCompatibility> {
        &self.ctx.compat
    }

    pub fn registry(&self) -> &Arc<RowsetRegistry> {
        &self.ctx.registry
    }

    pub fn context(&self) -> &RowsetContext {
        &self.ctx
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn connection_id(&self) -> i32 {
        self.channel.connection_id()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ========================================================================
    // ROWSETS
    // ========================================================================

    /// Open a rowset over `entity`. Nothing is sent to the server until the
    /// first data access.
    pub fn open_rowset(&self, entity: EntityConfig, rowset_type: RowSetType) -> Arc<LocalRowset> {
        let rowset = Arc::new(LocalRowset::new(entity, rowset_type, &self.ctx));
        let mut rowsets = self.rowsets.lock();
        rowsets.retain(|weak| weak.strong_count() > 0);
        rowsets.push(Arc::downgrade(&rowset));
        rowset
    }

    pub fn jobs(&self, rowset_type: RowSetType) -> Arc<LocalRowset> {
        self.open_rowset(EntityConfig::jobs(), rowset_type)
    }

    pub fn tasks(&self, rowset_type: RowSetType, expand_parametric: bool) -> Arc<LocalRowset> {
        self.open_rowset(EntityConfig::tasks(expand_parametric), rowset_type)
    }

    pub fn tasks_of_job(
        &self,
        job_id: i32,
        rowset_type: RowSetType,
        expand_parametric: bool,
    ) -> Arc<LocalRowset> {
        self.open_rowset(EntityConfig::tasks_of_job(job_id, expand_parametric), rowset_type)
    }

    pub fn nodes(&self, rowset_type: RowSetType) -> Arc<LocalRowset> {
        self.open_rowset(EntityConfig::nodes(), rowset_type)
    }

    pub fn resources(&self, rowset_type: RowSetType) -> Arc<LocalRowset> {
        self.open_rowset(EntityConfig::resources(), rowset_type)
    }

    pub fn allocations(&self, rowset_type: RowSetType) -> Arc<LocalRowset> {
        self.open_rowset(EntityConfig::allocations(), rowset_type)
    }

    /// `None` for object types without a rowset configuration.
    pub fn open_for(
        &self,
        object_type: ObjectType,
        rowset_type: RowSetType,
    ) -> Option<Arc<LocalRowset>> {
        EntityConfig::for_object_type(object_type)
            .map(|entity| self.open_rowset(entity, rowset_type))
    }

    /// Rowsets opened through this connection and still alive.
    pub fn open_rowsets(&self) -> Vec<Arc<LocalRowset>> {
        self.rowsets.lock().iter().filter_map(Weak::upgrade).collect()
    }

    /// Touch every registered Dynamic rowset now; returns how many
    /// succeeded.
    pub fn touch_all(&self) -> usize {
        touch_registered(self.ctx.service.as_ref(), &self.ctx.registry)
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub fn subscribe<F>(&self, kind: EntityKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ObjectEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(kind, handler)
    }

    /// Like [`subscribe`](Self::subscribe), but only events whose pushed
    /// properties satisfy every filter reach `handler`. Filters see the
    /// properties exactly as the server sent them.
    pub fn subscribe_filtered<F>(
        &self,
        kind: EntityKind,
        filters: Vec<FilterProperty>,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&ObjectEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(kind, move |event| {
            let row = PropertyRow::indexed(event.properties.clone());
            if filters.iter().all(|f| f.matches_row(&row)) {
                handler(event);
            }
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    /// Close every open rowset, then stop the keep-alive and the channel.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let rowsets: Vec<Arc<LocalRowset>> = self
            .rowsets
            .lock()
            .drain(..)
            .filter_map(|weak| weak.upgrade())
            .collect();
        debug!(rowsets = rowsets.len(), "closing rowsets");
        for rowset in rowsets {
            rowset.close();
        }
        if let Some(mut keep_alive) = self.keep_alive.lock().take() {
            keep_alive.stop();
        }
        self.channel.shutdown();
        info!(scheduler = %self.config.scheduler, "scheduler connection closed");
    }
}

impl Drop for SchedulerConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
