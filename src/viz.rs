//! Visualization functions using Plotters for cluster diagnostics

use plotters::prelude::*;

use crate::cluster::StoreClusters;

/// Color palette for different clusters
static CLUSTER_COLORS: [RGBColor; 10] = [
    RED,
    BLUE,
    GREEN,
    YELLOW,
    MAGENTA,
    CYAN,
    RGBColor(255, 140, 0),
    RGBColor(128, 0, 128),
    RGBColor(139, 69, 19),
    RGBColor(0, 128, 128),
];

fn cluster_color(cluster: usize) -> &'static RGBColor {
    CLUSTER_COLORS.get(cluster).unwrap_or(&BLACK)
}

fn padded(min: f64, max: f64) -> (f64, f64) {
    let pad = ((max - min) * 0.1).max(0.05);
    (min - pad, max + pad)
}

/// Scatter plot of store locations colored by cluster, with the medoid
/// of each cluster drawn as a filled square.
///
/// # Arguments
/// * `clusters` - fitted store clusters
/// * `output_path` - path to save the PNG plot
pub fn plot_store_map(clusters: &StoreClusters, output_path: &str) -> crate::Result<()> {
    let lons: Vec<f64> = clusters.stores.iter().map(|s| s.longitude).collect();
    let lats: Vec<f64> = clusters.stores.iter().map(|s| s.latitude).collect();

    let lon_min = lons.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let lon_max = lons.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let lat_min = lats.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let lat_max = lats.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let (x_min, x_max) = padded(lon_min, lon_max);
    let (y_min, y_max) = padded(lat_min, lat_max);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Store Clusters and Selected Medoids", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Longitude")
        .y_desc("Latitude")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (i, store) in clusters.stores.iter().enumerate() {
        let color = cluster_color(clusters.assignments[i]);
        chart.draw_series(std::iter::once(Circle::new(
            (store.longitude, store.latitude),
            4,
            color.filled(),
        )))?;
    }

    // Medoids as larger squares with a legend entry each
    let half_x = (x_max - x_min) * 0.015;
    let half_y = (y_max - y_min) * 0.015;
    for (pos, medoid) in clusters.medoid_stores().iter().enumerate() {
        let color = cluster_color(pos);
        let (x, y) = (medoid.longitude, medoid.latitude);
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x - half_x, y - half_y), (x + half_x, y + half_y)],
                color.filled(),
            )))?
            .label(format!("Medoid store {}", medoid.store_id))
            .legend(move |(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], color.filled()));
    }

    chart.configure_series_labels().draw()?;

    root.present()?;
    println!("Store map saved to: {}", output_path);

    Ok(())
}

/// Bar chart of the number of stores in each cluster.
pub fn plot_cluster_sizes(clusters: &StoreClusters, output_path: &str) -> crate::Result<()> {
    let cluster_sizes = clusters.cluster_sizes();
    let max_size = *cluster_sizes.iter().max().unwrap_or(&1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cluster Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..(clusters.k() as f64), 0f64..(max_size * 1.1))?;

    chart
        .configure_mesh()
        .x_desc("Cluster")
        .y_desc("Number of Stores")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (cluster_id, &size) in cluster_sizes.iter().enumerate() {
        let color = cluster_color(cluster_id);
        chart.draw_series(std::iter::once(Rectangle::new(
            [
                (cluster_id as f64 + 0.1, 0.0),
                (cluster_id as f64 + 0.9, size as f64),
            ],
            color.filled(),
        )))?;
    }

    root.present()?;
    println!("Cluster size chart saved to: {}", output_path);

    Ok(())
}

/// Generate the full set of cluster diagnostic plots: the store map at
/// `base_output_path` and the size chart next to it.
pub fn generate_cluster_report(clusters: &StoreClusters, base_output_path: &str) -> crate::Result<()> {
    plot_store_map(clusters, base_output_path)?;

    let size_chart_path = base_output_path.replace(".png", "_sizes.png");
    plot_cluster_sizes(clusters, &size_chart_path)?;

    Ok(())
}
