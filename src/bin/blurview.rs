use std::{
    cell::RefCell,
    path::PathBuf,
    rc::{Rc, Weak},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

use blurview::{
    BackendKind, BlurConfig, BlurView, CapabilityTier, Color, DrawSurface, HostSignal,
    PixmapCanvas, Point, Rect, SignalHub, Size, View,
};

#[derive(Parser, Debug)]
#[command(name = "blurview", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one frame of a striped test scene with a blur surface on top, as a PNG.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Scene width in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Scene height in pixels.
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Blur surface rectangle as `x,y,w,h`.
    #[arg(long, default_value = "80,120,480,240")]
    surface: SurfaceRect,

    /// Second blur surface `x,y,w,h`, drawn above the first and sharing its content root.
    #[arg(long)]
    nested: Option<SurfaceRect>,

    /// Blur settings JSON. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Blur radius in snapshot pixels.
    #[arg(long)]
    radius: Option<f32>,

    /// Snapshot downscale factor.
    #[arg(long)]
    scale_factor: Option<f32>,

    /// Backend to use.
    #[arg(long, value_enum)]
    backend: Option<BackendChoice>,

    /// Overlay color as `#RRGGBB` or `#AARRGGBB`.
    #[arg(long)]
    overlay: Option<String>,

    /// Draw the grain overlay.
    #[arg(long)]
    noise: bool,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Log pipeline activity to stderr.
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Noop,
    Software,
    Compositor,
    Compute,
}

impl From<BackendChoice> for BackendKind {
    fn from(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Noop => Self::NoOp,
            BackendChoice::Software => Self::Software,
            BackendChoice::Compositor => Self::CompositorEffect,
            BackendChoice::Compute => Self::LegacyCompute,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct SurfaceRect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl std::str::FromStr for SurfaceRect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid surface '{s}': {e}"))?;
        match parts.as_slice() {
            &[x, y, w, h] => Ok(Self { x, y, w, h }),
            _ => Err(format!("surface must be x,y,w,h, got '{s}'")),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
    }
}

fn load_config(args: &RenderArgs) -> anyhow::Result<BlurConfig> {
    let mut cfg = match &args.config {
        Some(path) => BlurConfig::from_path(path)
            .with_context(|| format!("load blur config '{}'", path.display()))?,
        None => BlurConfig::default(),
    };
    if let Some(r) = args.radius {
        cfg.radius = r;
    }
    if let Some(f) = args.scale_factor {
        cfg.scale_factor = Some(f);
    }
    if let Some(b) = args.backend {
        cfg.backend = Some(b.into());
    }
    if let Some(hex) = &args.overlay {
        cfg.overlay_color = Color::parse_hex(hex)?;
    }
    if args.noise {
        cfg.noise = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    if args.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }
    let cfg = load_config(&args)?;

    let scene_size = Size::new(args.width, args.height);
    anyhow::ensure!(!scene_size.is_empty(), "scene size must be non-zero");

    let hub = Rc::new(SignalHub::new());
    let stripes = Rc::new(Stripes {
        size: scene_size,
        panels: RefCell::new(Vec::new()),
    });
    let root: Rc<dyn View> = stripes.clone();

    let mut handles = Vec::new();
    for rect in std::iter::once(args.surface).chain(args.nested) {
        let panel = Rc::new(Panel {
            parent: Rc::downgrade(&stripes),
            rect,
            blur: RefCell::new(None),
        });
        stripes.panels.borrow_mut().push(Rc::clone(&panel));

        let node: Rc<dyn View> = panel.clone();
        let mut blur = BlurView::new(&node, hub.clone(), CapabilityTier::Software);
        let handle = blur.setup_with(Rc::clone(&root), cfg.setup_options()?)?;
        cfg.apply(&mut handle.controller().borrow_mut())?;
        *panel.blur.borrow_mut() = Some(blur);
        handles.push(handle);
    }

    hub.dispatch(HostSignal::LayoutComplete);
    hub.dispatch(HostSignal::PreDraw);

    let mut canvas = PixmapCanvas::new(scene_size)?;
    canvas.erase(Color::BLACK);
    root.draw(&mut canvas);
    let frame = canvas.into_bitmap()?;

    for (i, handle) in handles.iter().enumerate() {
        tracing::info!(
            surface = i,
            stats = ?handle.stats(),
            state = ?handle.state(),
            "frame rendered"
        );
    }

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        frame.data(),
        frame.width(),
        frame.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    for panel in stripes.panels.borrow().iter() {
        panel.blur.take();
    }
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

/// Content root: vertical color bands with the blur panels as children.
struct Stripes {
    size: Size,
    panels: RefCell<Vec<Rc<Panel>>>,
}

/// Blur surface host node. Its own content is a translucent title bar.
struct Panel {
    parent: Weak<Stripes>,
    rect: SurfaceRect,
    blur: RefCell<Option<BlurView>>,
}

const BANDS: [Color; 4] = [
    Color::from_rgb(0xE6, 0x39, 0x46),
    Color::from_rgb(0xF1, 0xFA, 0xEE),
    Color::from_rgb(0x45, 0x7B, 0x9D),
    Color::from_rgb(0x1D, 0x35, 0x57),
];

const BAND_WIDTH: f64 = 32.0;

impl View for Stripes {
    fn width(&self) -> u32 {
        self.size.width
    }

    fn height(&self) -> u32 {
        self.size.height
    }

    fn location_on_screen(&self) -> Point {
        Point::ORIGIN
    }

    fn draw(&self, surface: &mut dyn DrawSurface) {
        let w = f64::from(self.size.width);
        let h = f64::from(self.size.height);
        let mut x = 0.0;
        let mut i = 0usize;
        while x < w {
            surface.fill_rect(Rect::new(x, 0.0, x + BAND_WIDTH, h), BANDS[i % BANDS.len()]);
            x += BAND_WIDTH;
            i += 1;
        }
        surface.fill_rect(
            Rect::new(w * 0.25, h * 0.1, w * 0.75, h * 0.3),
            Color::from_rgb(0xFF, 0xB7, 0x03),
        );

        let panels = self.panels.borrow().clone();
        for panel in panels {
            surface.save();
            surface.translate(panel.left(), panel.top());
            panel.draw(surface);
            surface.restore();
        }
    }
}

impl View for Panel {
    fn width(&self) -> u32 {
        self.rect.w
    }

    fn height(&self) -> u32 {
        self.rect.h
    }

    fn left(&self) -> f64 {
        f64::from(self.rect.x)
    }

    fn top(&self) -> f64 {
        f64::from(self.rect.y)
    }

    fn parent(&self) -> Option<Rc<dyn View>> {
        let parent: Rc<dyn View> = self.parent.upgrade()?;
        Some(parent)
    }

    fn location_on_screen(&self) -> Point {
        Point::new(self.left(), self.top())
    }

    fn draw(&self, surface: &mut dyn DrawSurface) {
        let draw_children = match self.blur.try_borrow() {
            Ok(blur) => blur.as_ref().is_none_or(|b| b.draw(surface)),
            Err(_) => true,
        };
        if draw_children {
            surface.fill_rect(
                Rect::new(16.0, 16.0, f64::from(self.rect.w) - 16.0, 48.0),
                Color::from_argb(0xCC, 0xFF, 0xFF, 0xFF),
            );
        }
    }
}
